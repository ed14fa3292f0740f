//! Project scanner
//!
//! Enumerates public projects and resolves privileged milestone detail. The
//! detail record for a project is fetched at most once per cycle through a
//! [`DetailCache`] owned by that cycle.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{ProjectDetail, ProjectId, ProjectSummary};
use crate::error::{AuditError, Result};
use crate::registry::RegistryClient;
use crate::session::AuditSession;

/// Reads the registry on behalf of the auditor
pub struct ProjectScanner {
    registry: Arc<dyn RegistryClient>,
    session: Arc<AuditSession>,
}

impl ProjectScanner {
    pub fn new(registry: Arc<dyn RegistryClient>, session: Arc<AuditSession>) -> Self {
        Self { registry, session }
    }

    /// Public listing. A failure here aborts the cycle.
    pub async fn list_public_projects(&self) -> Result<Vec<ProjectSummary>> {
        self.registry.list_public_projects().await
    }

    /// Privileged detail, re-authenticating once if the credential is refused.
    pub async fn get_project_detail(&self, project_id: &ProjectId) -> Result<ProjectDetail> {
        self.session
            .with_credential(|credential| async move {
                self.registry
                    .get_project_detail(project_id, &credential)
                    .await
            })
            .await
    }

    /// Detail from `cache`, fetching it on first use within the cycle.
    ///
    /// Failures are not cached; the caller skips the project.
    pub async fn detail_for<'c>(
        &self,
        cache: &'c mut DetailCache,
        project_id: &ProjectId,
    ) -> Result<&'c ProjectDetail> {
        if !cache.contains(project_id) {
            let detail = self.get_project_detail(project_id).await?;
            debug!(
                project_id = %project_id,
                milestones = detail.milestones.len(),
                "Fetched project detail"
            );
            cache.insert(project_id.clone(), detail);
        }
        cache
            .get(project_id)
            .ok_or_else(|| AuditError::network("get_project_detail", "detail cache miss"))
    }
}

/// Project detail memoized for the duration of one cycle
#[derive(Debug, Default)]
pub struct DetailCache {
    entries: HashMap<ProjectId, ProjectDetail>,
}

impl DetailCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project_id: &ProjectId) -> Option<&ProjectDetail> {
        self.entries.get(project_id)
    }

    pub fn contains(&self, project_id: &ProjectId) -> bool {
        self.entries.contains_key(project_id)
    }

    pub fn insert(&mut self, project_id: ProjectId, detail: ProjectDetail) {
        self.entries.insert(project_id, detail);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
