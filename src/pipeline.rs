//! Audit pipeline
//!
//! One cycle is a sequential pass over the public listing:
//!
//! 1. list public projects (failure aborts the cycle)
//! 2. for each project with VERIFIED milestones, fetch privileged detail once
//!    (failure skips the project)
//! 3. for each candidate with an evidence reference: fetch the document,
//!    extract its text, validate, and flag on failure (errors skip the
//!    milestone)
//!
//! Nothing is remembered between cycles; a milestone that stays VERIFIED is
//! re-audited every cycle.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::domain::{MilestoneDetail, ProjectId, ProjectSummary};
use crate::error::Result;
use crate::evidence::EvidenceSource;
use crate::extraction::TextRecognizer;
use crate::metrics::AuditMetrics;
use crate::registry::RegistryClient;
use crate::reporter::FlagReporter;
use crate::scanner::{DetailCache, ProjectScanner};
use crate::session::AuditSession;
use crate::validation::{Decision, RuleEngine};

/// Why a candidate milestone was not audited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No invoice proof reference has been submitted
    NoEvidence,
    /// The privileged record does not list the milestone
    MissingFromDetail,
    /// The privileged record shows the milestone has moved on from VERIFIED
    NoLongerVerified,
}

/// Outcome of auditing one milestone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MilestoneVerdict {
    Passed,
    Flagged { reason: String, submitted: bool },
    Skipped(SkipReason),
}

/// Summary of one completed cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub projects_listed: usize,
    /// Projects whose detail could not be fetched
    pub projects_skipped: usize,
    pub candidates: usize,
    pub passed: usize,
    pub flagged: usize,
    pub skipped: usize,
    pub errored: usize,
    pub flags_submitted: usize,
    pub flags_failed: usize,
    pub duration_ms: u64,
}

impl CycleReport {
    fn new(cycle_id: Uuid) -> Self {
        Self {
            cycle_id,
            started_at: Utc::now(),
            projects_listed: 0,
            projects_skipped: 0,
            candidates: 0,
            passed: 0,
            flagged: 0,
            skipped: 0,
            errored: 0,
            flags_submitted: 0,
            flags_failed: 0,
            duration_ms: 0,
        }
    }

    fn record(&mut self, verdict: &MilestoneVerdict) {
        match verdict {
            MilestoneVerdict::Passed => self.passed += 1,
            MilestoneVerdict::Flagged { submitted, .. } => {
                self.flagged += 1;
                if *submitted {
                    self.flags_submitted += 1;
                } else {
                    self.flags_failed += 1;
                }
            }
            MilestoneVerdict::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Wires the scanner, evidence source, OCR engine, rule engine and reporter
/// into one audit pass.
pub struct AuditPipeline {
    scanner: ProjectScanner,
    evidence: Arc<dyn EvidenceSource>,
    recognizer: Arc<dyn TextRecognizer>,
    rules: RuleEngine,
    reporter: FlagReporter,
    metrics: Arc<AuditMetrics>,
}

impl AuditPipeline {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        session: Arc<AuditSession>,
        evidence: Arc<dyn EvidenceSource>,
        recognizer: Arc<dyn TextRecognizer>,
        rules: RuleEngine,
        metrics: Arc<AuditMetrics>,
    ) -> Self {
        Self {
            scanner: ProjectScanner::new(registry.clone(), session.clone()),
            evidence,
            recognizer,
            rules,
            reporter: FlagReporter::new(registry, session),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Arc<AuditMetrics> {
        &self.metrics
    }

    /// Run one full audit pass inside an `audit_cycle` span.
    ///
    /// Only a failed public listing fails the cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("audit_cycle", cycle_id = %cycle_id);
        self.run_cycle_inner(cycle_id).instrument(span).await
    }

    async fn run_cycle_inner(&self, cycle_id: Uuid) -> Result<CycleReport> {
        let started = Instant::now();
        let mut report = CycleReport::new(cycle_id);
        info!("Audit cycle started");

        let projects = match self.scanner.list_public_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                error!(error = %e, error_kind = e.kind(), "Public project listing failed");
                return Err(e);
            }
        };
        report.projects_listed = projects.len();

        let mut cache = DetailCache::new();
        for project in &projects {
            self.audit_project(project, &mut cache, &mut report).await;
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            projects = report.projects_listed,
            candidates = report.candidates,
            passed = report.passed,
            flagged = report.flagged,
            skipped = report.skipped,
            errored = report.errored,
            duration_ms = report.duration_ms,
            "Audit cycle finished"
        );
        Ok(report)
    }

    async fn audit_project(
        &self,
        project: &ProjectSummary,
        cache: &mut DetailCache,
        report: &mut CycleReport,
    ) {
        let candidates: Vec<_> = project.audit_candidates().collect();
        if candidates.is_empty() {
            return;
        }
        report.candidates += candidates.len();

        let project_id = &project.project_id;
        let detail = match self.scanner.detail_for(cache, project_id).await {
            Ok(detail) => detail,
            Err(e) => {
                warn!(
                    project_id = %project_id,
                    error = %e,
                    error_kind = e.kind(),
                    "Project detail unavailable, skipping project"
                );
                report.projects_skipped += 1;
                return;
            }
        };

        for candidate in candidates {
            let milestone_id = &candidate.milestone_id;
            let verdict = match detail.milestone(milestone_id) {
                Some(milestone) => self.audit_milestone(project_id, milestone).await,
                None => {
                    debug!(
                        project_id = %project_id,
                        milestone_id = %milestone_id,
                        "Milestone missing from project detail"
                    );
                    Ok(MilestoneVerdict::Skipped(SkipReason::MissingFromDetail))
                }
            };

            match verdict {
                Ok(verdict) => report.record(&verdict),
                Err(e) => {
                    self.metrics.record_errored();
                    report.errored += 1;
                    warn!(
                        project_id = %project_id,
                        milestone_id = %milestone_id,
                        error = %e,
                        error_kind = e.kind(),
                        "Milestone audit failed"
                    );
                }
            }
        }
    }

    /// Audit one VERIFIED milestone against its privileged record.
    pub async fn audit_milestone(
        &self,
        project_id: &ProjectId,
        milestone: &MilestoneDetail,
    ) -> Result<MilestoneVerdict> {
        let milestone_id = &milestone.milestone_id;

        if milestone.left_verified() {
            debug!(
                project_id = %project_id,
                milestone_id = %milestone_id,
                status = ?milestone.status,
                "Milestone no longer verified"
            );
            return Ok(MilestoneVerdict::Skipped(SkipReason::NoLongerVerified));
        }

        let Some(content_id) = milestone.evidence_id() else {
            debug!(
                project_id = %project_id,
                milestone_id = %milestone_id,
                "No invoice proof submitted"
            );
            return Ok(MilestoneVerdict::Skipped(SkipReason::NoEvidence));
        };

        info!(
            project_id = %project_id,
            milestone_id = %milestone_id,
            content_id = %content_id,
            "Auditing milestone invoice"
        );

        let text = {
            let document = self.evidence.fetch(content_id).await?;
            self.recognizer.extract_text(&document.bytes).await?
        };

        match self.rules.decide(&text, milestone, project_id) {
            Decision::Pass => {
                self.metrics.record_passed();
                info!(
                    project_id = %project_id,
                    milestone_id = %milestone_id,
                    "Invoice verified"
                );
                Ok(MilestoneVerdict::Passed)
            }
            Decision::Flag { errors, reason } => {
                self.metrics.record_flagged();
                warn!(
                    project_id = %project_id,
                    milestone_id = %milestone_id,
                    failures = errors.len(),
                    reason = %reason,
                    "Invoice failed validation"
                );

                let submitted = match self
                    .reporter
                    .report_flag(project_id, milestone_id, &reason)
                    .await
                {
                    Ok(()) => {
                        self.metrics.record_flag_submitted();
                        true
                    }
                    Err(e) => {
                        self.metrics.record_flag_failed();
                        error!(
                            project_id = %project_id,
                            milestone_id = %milestone_id,
                            error = %e,
                            error_kind = e.kind(),
                            "Flag submission failed"
                        );
                        false
                    }
                };

                Ok(MilestoneVerdict::Flagged { reason, submitted })
            }
        }
    }
}
