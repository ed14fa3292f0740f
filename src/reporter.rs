//! Flag reporter
//!
//! Submits fraud flags for milestones whose invoice failed validation.

use std::sync::Arc;

use tracing::info;

use crate::domain::{FlagReport, MilestoneId, ProjectId};
use crate::error::Result;
use crate::registry::RegistryClient;
use crate::session::AuditSession;

pub struct FlagReporter {
    registry: Arc<dyn RegistryClient>,
    session: Arc<AuditSession>,
}

impl FlagReporter {
    pub fn new(registry: Arc<dyn RegistryClient>, session: Arc<AuditSession>) -> Self {
        Self { registry, session }
    }

    /// Submit one flag. A failure is scoped to the milestone.
    pub async fn report_flag(
        &self,
        project_id: &ProjectId,
        milestone_id: &MilestoneId,
        reason: &str,
    ) -> Result<()> {
        let report = FlagReport {
            project_id: project_id.clone(),
            milestone_id: milestone_id.clone(),
            reason: reason.to_string(),
        };

        let report = &report;
        self.session
            .with_credential(|credential| async move {
                self.registry.report_flag(report, &credential).await
            })
            .await?;

        info!(
            project_id = %project_id,
            milestone_id = %milestone_id,
            "Flag submitted"
        );
        Ok(())
    }
}
