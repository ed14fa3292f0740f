//! Process bootstrap for the milestone auditor.
//!
//! This module wires together:
//! - telemetry and configuration
//! - the registry client and auditor session
//! - the evidence fetcher and OCR engine
//! - the audit pipeline and poll scheduler

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use crate::config::AuditorConfig;
use crate::evidence::GatewayEvidenceFetcher;
use crate::extraction::TesseractEngine;
use crate::infra::{shutdown_signal, ShutdownCoordinator};
use crate::metrics::AuditMetrics;
use crate::pipeline::AuditPipeline;
use crate::registry::{HttpRegistryClient, RegistryClient};
use crate::scheduler::PollScheduler;
use crate::session::AuditSession;
use crate::telemetry::{init_telemetry, TelemetryConfig};
use crate::validation::RuleEngine;

/// Run the auditor until Ctrl+C or SIGTERM.
///
/// Configuration, OCR engine initialization and the first authentication are
/// fatal; everything after that is handled per cycle.
pub async fn run() -> anyhow::Result<()> {
    let telemetry = TelemetryConfig::from_env();
    init_telemetry(&telemetry)
        .map_err(|e| anyhow::anyhow!("failed to initialize telemetry: {e}"))?;

    info!(
        service = %telemetry.service_name,
        version = %telemetry.service_version,
        "Starting milestone auditor"
    );

    let config = match AuditorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e).context("loading configuration");
        }
    };
    info!(config = ?config, "Configuration loaded");

    let registry: Arc<dyn RegistryClient> = Arc::new(
        HttpRegistryClient::new(&config.api_base_url, config.request_timeout)
            .context("building registry client")?,
    );
    let session = Arc::new(AuditSession::new(
        registry.clone(),
        &config.auditor_username,
        &config.auditor_password,
    ));

    if let Err(e) = session.authenticate().await {
        error!(error = %e, error_kind = e.kind(), "Initial authentication failed");
        return Err(e).context("authenticating auditor");
    }

    let engine = match TesseractEngine::initialize(config.ocr.clone()).await {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!(error = %e, "OCR engine initialization failed");
            return Err(e).context("initializing OCR engine");
        }
    };

    let evidence = Arc::new(
        GatewayEvidenceFetcher::new(
            &config.gateway_base_url,
            config.request_timeout,
            config.max_evidence_bytes,
        )
        .context("building evidence fetcher")?,
    );

    let metrics = Arc::new(AuditMetrics::new());
    let pipeline = Arc::new(AuditPipeline::new(
        registry,
        session,
        evidence,
        engine.clone(),
        RuleEngine::new(config.strictness),
        metrics.clone(),
    ));

    let scheduler = Arc::new(PollScheduler::new(
        pipeline,
        config.poll_interval,
        config.drain_timeout,
    ));

    let coordinator = ShutdownCoordinator::new();
    let scheduler_task = tokio::spawn(scheduler.run(coordinator.signal()));

    info!(
        strictness = %config.strictness,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        "Milestone auditor running"
    );

    shutdown_signal().await;
    coordinator.shutdown();

    if let Err(e) = scheduler_task.await {
        error!(error = %e, "Poll scheduler task ended abnormally");
    }

    engine.shutdown().await;
    info!(metrics = %metrics.to_json(), "Milestone auditor stopped");
    Ok(())
}
