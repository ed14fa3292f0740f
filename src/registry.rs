//! Registry API client
//!
//! The registry is reached only through its fixed request/response contract:
//!
//! - `POST /auth/login` - obtain a bearer token
//! - `GET /projects` - public project listing
//! - `GET /projects/{projectId}` - privileged project detail (bearer auth)
//! - `POST /alerts/flag-ai` - submit a fraud flag (bearer auth)
//!
//! 401 and 403 responses map to [`AuditError::Auth`] so the session can
//! re-authenticate; any other failure is an [`AuditError::Network`].

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{FlagReport, MilestoneDetail, ProjectDetail, ProjectId, ProjectSummary};
use crate::domain::nullable_vec;
use crate::error::{AuditError, Result};
use crate::session::AuditCredential;

/// Operations the auditor needs from the registry.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Exchange username/password for a bearer token
    async fn login(&self, username: &str, password: &str) -> Result<String>;

    /// Public project listing (no credential)
    async fn list_public_projects(&self) -> Result<Vec<ProjectSummary>>;

    /// Privileged project record including payment amounts and evidence references
    async fn get_project_detail(
        &self,
        project_id: &ProjectId,
        credential: &AuditCredential,
    ) -> Result<ProjectDetail>;

    /// Submit a fraud flag for a milestone
    async fn report_flag(&self, report: &FlagReport, credential: &AuditCredential) -> Result<()>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

/// Project record as the registry sends it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRecord {
    #[serde(default)]
    project_id: Option<ProjectId>,
    #[serde(default, deserialize_with = "nullable_vec")]
    milestones: Vec<MilestoneDetail>,
}

/// The detail endpoint answers either with a project object or a bare
/// milestone array.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProjectDetailResponse {
    Milestones(Vec<MilestoneDetail>),
    Project(ProjectRecord),
}

impl ProjectDetailResponse {
    /// A record naming a different project than the one requested is rejected.
    fn into_detail(self, requested: &ProjectId) -> Result<ProjectDetail> {
        let milestones = match self {
            ProjectDetailResponse::Milestones(milestones) => milestones,
            ProjectDetailResponse::Project(record) => {
                match record.project_id.filter(|id| !id.as_str().is_empty()) {
                    Some(returned) if &returned != requested => {
                        return Err(AuditError::network(
                            "get_project_detail",
                            format!("requested project {requested} but registry returned {returned}"),
                        ));
                    }
                    _ => record.milestones,
                }
            }
        };

        Ok(ProjectDetail {
            project_id: requested.clone(),
            milestones,
        })
    }
}

/// HTTP implementation of [`RegistryClient`]
#[derive(Clone)]
pub struct HttpRegistryClient {
    base_url: String,
    client: Client,
}

impl HttpRegistryClient {
    /// Create a client with a finite per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AuditError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base}/projects/{id}` with the id percent-encoded as one path segment
    fn project_url(&self, project_id: &ProjectId) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            AuditError::Configuration(format!("invalid registry URL {}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                AuditError::Configuration(format!("registry URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .push("projects")
            .push(project_id.as_str());
        Ok(url)
    }
}

/// Map a non-success response to the error taxonomy.
async fn check_status(operation: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body = body.chars().take(256).collect::<String>();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuditError::Auth(format!(
            "{operation} rejected with HTTP {status}: {body}"
        ))),
        _ => Err(AuditError::network(
            operation,
            format!("HTTP {status}: {body}"),
        )),
    }
}

fn transport_error(operation: &'static str, err: reqwest::Error) -> AuditError {
    AuditError::network(operation, err.to_string())
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn login(&self, username: &str, password: &str) -> Result<String> {
        const OP: &str = "login";
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(|e| transport_error(OP, e))?;

        // The registry answers bad credentials with 400.
        if response.status() == StatusCode::BAD_REQUEST {
            return Err(AuditError::Auth(format!(
                "credentials for {username} rejected"
            )));
        }

        let body: LoginResponse = check_status(OP, response)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(OP, e))?;

        if body.token.trim().is_empty() {
            return Err(AuditError::Auth("registry returned an empty token".to_string()));
        }
        Ok(body.token)
    }

    async fn list_public_projects(&self) -> Result<Vec<ProjectSummary>> {
        const OP: &str = "list_public_projects";
        let response = self
            .client
            .get(self.url("/projects"))
            .send()
            .await
            .map_err(|e| transport_error(OP, e))?;

        let projects: Option<Vec<ProjectSummary>> = check_status(OP, response)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(OP, e))?;

        let projects = projects.unwrap_or_default();
        debug!(count = projects.len(), "Fetched public project listing");
        Ok(projects)
    }

    async fn get_project_detail(
        &self,
        project_id: &ProjectId,
        credential: &AuditCredential,
    ) -> Result<ProjectDetail> {
        const OP: &str = "get_project_detail";
        let response = self
            .client
            .get(self.project_url(project_id)?)
            .bearer_auth(credential.token())
            .send()
            .await
            .map_err(|e| transport_error(OP, e))?;

        let detail: ProjectDetailResponse = check_status(OP, response)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(OP, e))?;

        detail.into_detail(project_id)
    }

    async fn report_flag(&self, report: &FlagReport, credential: &AuditCredential) -> Result<()> {
        const OP: &str = "report_flag";
        let response = self
            .client
            .post(self.url("/alerts/flag-ai"))
            .bearer_auth(credential.token())
            .json(report)
            .send()
            .await
            .map_err(|e| transport_error(OP, e))?;

        check_status(OP, response).await?;
        Ok(())
    }
}
