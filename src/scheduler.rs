//! Poll scheduler
//!
//! Triggers an audit cycle immediately at startup and then on a fixed
//! interval. At most one cycle runs at a time: a tick that arrives while a
//! cycle is in flight is dropped, not queued. Each cycle runs on its own task
//! so the ticker keeps observing overlaps while a long cycle is busy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::error::AuditError;
use crate::infra::{wait_for_drain, ShutdownSignal};
use crate::metrics::AuditMetrics;
use crate::pipeline::{AuditPipeline, CycleReport};

/// Result of one `run_cycle` invocation
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// The cycle ran and aborted; the next tick starts over
    Failed(AuditError),
    /// Another cycle was already running
    Skipped,
}

impl CycleOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleOutcome::Skipped)
    }
}

/// Holds the in-progress flag; clearing it on drop covers errors and panics.
struct CycleGuard {
    flag: Arc<AtomicBool>,
}

impl CycleGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct PollScheduler {
    pipeline: Arc<AuditPipeline>,
    metrics: Arc<AuditMetrics>,
    interval: Duration,
    drain_timeout: Duration,
    in_progress: Arc<AtomicBool>,
}

impl PollScheduler {
    pub fn new(pipeline: Arc<AuditPipeline>, interval: Duration, drain_timeout: Duration) -> Self {
        let metrics = pipeline.metrics().clone();
        Self {
            pipeline,
            metrics,
            interval: interval.max(Duration::from_millis(1)),
            drain_timeout,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_cycle_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Run one audit cycle unless one is already in flight.
    ///
    /// Never returns an error: a failed cycle is logged and reported as
    /// [`CycleOutcome::Failed`].
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = CycleGuard::try_acquire(&self.in_progress) else {
            self.metrics.record_cycle_skipped();
            info!("Previous audit cycle still running, skipping tick");
            return CycleOutcome::Skipped;
        };

        self.metrics.record_cycle_started();
        match self.pipeline.run_cycle().await {
            Ok(report) => {
                self.metrics.record_cycle_completed();
                info!(
                    cycle_id = %report.cycle_id,
                    metrics = %self.metrics.to_json(),
                    "Audit cycle summary"
                );
                CycleOutcome::Completed(report)
            }
            Err(e) => {
                self.metrics.record_cycle_failed();
                error!(
                    error = %e,
                    error_kind = e.kind(),
                    metrics = %self.metrics.to_json(),
                    "Audit cycle failed"
                );
                CycleOutcome::Failed(e)
            }
        }
    }

    /// Tick until `shutdown`, then wait (bounded) for an in-flight cycle.
    pub async fn run(self: Arc<Self>, shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Poll scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        scheduler.run_cycle().await;
                    });
                }
            }
        }

        info!("Poll scheduler stopping");
        let flag = self.in_progress.clone();
        wait_for_drain(|| flag.load(Ordering::Acquire), self.drain_timeout).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FlagReport, ProjectDetail, ProjectId, ProjectSummary};
    use crate::error::Result;
    use crate::evidence::MockEvidenceSource;
    use crate::extraction::MockTextRecognizer;
    use crate::infra::ShutdownCoordinator;
    use crate::registry::RegistryClient;
    use crate::session::{AuditCredential, AuditSession};
    use crate::validation::RuleEngine;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Notify;

    /// Registry whose listing can be held open, fail, or panic
    #[derive(Default)]
    struct FakeRegistry {
        listings: AtomicU32,
        hold: bool,
        fail: bool,
        panic: bool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn login(&self, _username: &str, _password: &str) -> Result<String> {
            Ok("token".to_string())
        }

        async fn list_public_projects(&self) -> Result<Vec<ProjectSummary>> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("listing exploded");
            }
            if self.hold {
                self.entered.notify_one();
                self.release.notified().await;
            }
            if self.fail {
                return Err(AuditError::network("list_public_projects", "connection refused"));
            }
            Ok(Vec::new())
        }

        async fn get_project_detail(
            &self,
            project_id: &ProjectId,
            _credential: &AuditCredential,
        ) -> Result<ProjectDetail> {
            Ok(ProjectDetail {
                project_id: project_id.clone(),
                milestones: Vec::new(),
            })
        }

        async fn report_flag(&self, _report: &FlagReport, _credential: &AuditCredential) -> Result<()> {
            Ok(())
        }
    }

    fn scheduler(registry: Arc<FakeRegistry>, interval: Duration) -> Arc<PollScheduler> {
        let registry: Arc<dyn RegistryClient> = registry;
        let session = Arc::new(AuditSession::new(registry.clone(), "admin1", "password123"));
        let pipeline = AuditPipeline::new(
            registry,
            session,
            Arc::new(MockEvidenceSource::new()),
            Arc::new(MockTextRecognizer::new()),
            RuleEngine::default(),
            Arc::new(AuditMetrics::new()),
        );
        Arc::new(PollScheduler::new(
            Arc::new(pipeline),
            interval,
            Duration::from_secs(1),
        ))
    }

    #[tokio::test]
    async fn test_overlapping_invocation_is_skipped() {
        let registry = Arc::new(FakeRegistry {
            hold: true,
            ..FakeRegistry::default()
        });
        let scheduler = scheduler(registry.clone(), Duration::from_secs(15));

        let first = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run_cycle().await })
        };
        registry.entered.notified().await;
        assert!(scheduler.is_cycle_in_progress());

        let second = scheduler.run_cycle().await;
        assert!(second.is_skipped());

        registry.release.notify_one();
        let first = first.await.unwrap();
        assert!(matches!(first, CycleOutcome::Completed(_)));

        assert_eq!(registry.listings.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_cycle_in_progress());

        let snapshot = scheduler.metrics.snapshot();
        assert_eq!(snapshot.cycles_started, 1);
        assert_eq!(snapshot.cycles_skipped, 1);
        assert_eq!(snapshot.cycles_completed, 1);
    }

    #[tokio::test]
    async fn test_failed_cycle_does_not_block_next() {
        let registry = Arc::new(FakeRegistry {
            fail: true,
            ..FakeRegistry::default()
        });
        let scheduler = scheduler(registry.clone(), Duration::from_secs(15));

        assert!(matches!(scheduler.run_cycle().await, CycleOutcome::Failed(_)));
        assert!(matches!(scheduler.run_cycle().await, CycleOutcome::Failed(_)));
        assert_eq!(registry.listings.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.metrics.snapshot().cycles_failed, 2);
    }

    #[tokio::test]
    async fn test_panicking_cycle_releases_guard() {
        let registry = Arc::new(FakeRegistry {
            panic: true,
            ..FakeRegistry::default()
        });
        let scheduler = scheduler(registry, Duration::from_secs(15));

        let task = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run_cycle().await })
        };
        assert!(task.await.is_err());
        assert!(!scheduler.is_cycle_in_progress());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_on_interval() {
        let registry = Arc::new(FakeRegistry::default());
        let scheduler = scheduler(registry.clone(), Duration::from_secs(15));
        let coordinator = ShutdownCoordinator::new();

        let handle = tokio::spawn(scheduler.clone().run(coordinator.signal()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.listings.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(registry.listings.load(Ordering::SeqCst), 3);

        coordinator.shutdown();
        handle.await.unwrap();
        assert_eq!(scheduler.metrics.snapshot().cycles_completed, 3);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_cycle() {
        let registry = Arc::new(FakeRegistry {
            hold: true,
            ..FakeRegistry::default()
        });
        let scheduler = scheduler(registry.clone(), Duration::from_secs(3600));
        let coordinator = ShutdownCoordinator::new();

        let handle = tokio::spawn(scheduler.clone().run(coordinator.signal()));
        registry.entered.notified().await;

        coordinator.shutdown();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());

        registry.release.notify_one();
        handle.await.unwrap();
        assert!(!scheduler.is_cycle_in_progress());
    }
}
