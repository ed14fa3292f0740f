//! Common test utilities and fixtures for integration tests
//!
//! Runs an in-process fake registry and evidence gateway on an ephemeral port
//! so the real HTTP clients are exercised end to end.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use milestone_auditor::evidence::GatewayEvidenceFetcher;
use milestone_auditor::extraction::TextRecognizer;
use milestone_auditor::infra::RetryConfig;
use milestone_auditor::metrics::AuditMetrics;
use milestone_auditor::registry::{HttpRegistryClient, RegistryClient};
use milestone_auditor::session::AuditSession;
use milestone_auditor::{AuditPipeline, RuleEngine, Strictness};

pub const USERNAME: &str = "admin1";
pub const PASSWORD: &str = "password123";

#[derive(Default)]
struct RegistryData {
    projects: Vec<Value>,
    details: HashMap<String, Value>,
    failing_details: HashSet<String>,
    documents: HashMap<String, Vec<u8>>,
    flags: Vec<Value>,
    logins: u32,
    valid_token: Option<String>,
}

/// Shared state of the fake registry and gateway
#[derive(Clone, Default)]
pub struct FakeRegistry {
    data: Arc<Mutex<RegistryData>>,
}

impl FakeRegistry {
    /// Publish a project with its privileged detail record
    pub fn add_project(&self, summary: Value, detail: Value) {
        let mut data = self.data.lock().unwrap();
        let id = summary["projectId"].as_str().unwrap().to_string();
        data.projects.push(summary);
        data.details.insert(id, detail);
    }

    /// Make the detail endpoint answer 500 for a project
    pub fn fail_detail(&self, project_id: &str) {
        let mut data = self.data.lock().unwrap();
        data.failing_details.insert(project_id.to_string());
    }

    /// Store an evidence document; the stub recognizer reads it as text
    pub fn add_document(&self, content_id: &str, text: &str) {
        let mut data = self.data.lock().unwrap();
        data.documents
            .insert(content_id.to_string(), text.as_bytes().to_vec());
    }

    /// Invalidate the issued token so the next privileged call gets 401
    pub fn revoke_token(&self) {
        self.data.lock().unwrap().valid_token = None;
    }

    pub fn flags(&self) -> Vec<Value> {
        self.data.lock().unwrap().flags.clone()
    }

    pub fn logins(&self) -> u32 {
        self.data.lock().unwrap().logins
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let data = self.data.lock().unwrap();
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match (presented, data.valid_token.as_deref()) {
            (Some(presented), Some(valid)) => presented == valid,
            _ => false,
        }
    }
}

async fn login(State(registry): State<FakeRegistry>, Json(body): Json<Value>) -> Response {
    if body["username"] != USERNAME || body["password"] != PASSWORD {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "Invalid credentials"})))
            .into_response();
    }
    let mut data = registry.data.lock().unwrap();
    data.logins += 1;
    let token = format!("token-{}", data.logins);
    data.valid_token = Some(token.clone());
    Json(json!({"token": token})).into_response()
}

async fn list_projects(State(registry): State<FakeRegistry>) -> Json<Value> {
    Json(Value::Array(registry.data.lock().unwrap().projects.clone()))
}

async fn project_detail(
    State(registry): State<FakeRegistry>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !registry.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let data = registry.data.lock().unwrap();
    if data.failing_details.contains(&project_id) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response();
    }
    match data.details.get(&project_id) {
        Some(detail) => Json(detail.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn flag_ai(
    State(registry): State<FakeRegistry>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !registry.authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    registry.data.lock().unwrap().flags.push(body);
    Json(json!({"message": "Flag recorded"})).into_response()
}

async fn ipfs(State(registry): State<FakeRegistry>, Path(content_id): Path<String>) -> Response {
    match registry.data.lock().unwrap().documents.get(&content_id) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Running fake registry and gateway
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: FakeRegistry,
}

impl TestServer {
    pub async fn start() -> Self {
        let registry = FakeRegistry::default();
        let app = Router::new()
            .route("/api/auth/login", post(login))
            .route("/api/projects", get(list_projects))
            .route("/api/projects/:project_id", get(project_detail))
            .route("/api/alerts/flag-ai", post(flag_ai))
            .route("/ipfs/:content_id", get(ipfs))
            .with_state(registry.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, registry }
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn gateway_base_url(&self) -> String {
        format!("http://{}/ipfs/", self.addr)
    }
}

/// Treats the evidence bytes as the recognized text
pub struct StubRecognizer;

#[async_trait]
impl TextRecognizer for StubRecognizer {
    async fn extract_text(&self, image: &[u8]) -> milestone_auditor::Result<String> {
        Ok(String::from_utf8_lossy(image).into_owned())
    }
}

/// Everything an end-to-end test needs
pub struct Harness {
    pub server: TestServer,
    pub registry_client: Arc<dyn RegistryClient>,
    pub session: Arc<AuditSession>,
    pub pipeline: AuditPipeline,
}

impl Harness {
    pub async fn start(strictness: Strictness) -> Self {
        let server = TestServer::start().await;
        let timeout = std::time::Duration::from_secs(5);

        let registry_client: Arc<dyn RegistryClient> =
            Arc::new(HttpRegistryClient::new(server.api_base_url(), timeout).unwrap());
        let session = Arc::new(AuditSession::new(registry_client.clone(), USERNAME, PASSWORD));
        let evidence = GatewayEvidenceFetcher::new(server.gateway_base_url(), timeout, 1024 * 1024)
            .unwrap()
            .with_retry(RetryConfig::none());

        let pipeline = AuditPipeline::new(
            registry_client.clone(),
            session.clone(),
            Arc::new(evidence),
            Arc::new(StubRecognizer),
            RuleEngine::new(strictness),
            Arc::new(AuditMetrics::new()),
        );

        Self {
            server,
            registry_client,
            session,
            pipeline,
        }
    }

    pub fn registry(&self) -> &FakeRegistry {
        &self.server.registry
    }
}

/// Public summary with a single VERIFIED milestone
pub fn verified_summary(project_id: &str, milestone_id: &str) -> Value {
    json!({
        "projectId": project_id,
        "title": "Road resurfacing",
        "milestones": [{"milestoneId": milestone_id, "status": "VERIFIED"}]
    })
}

/// Privileged detail with one VERIFIED milestone and its invoice reference
pub fn verified_detail(project_id: &str, milestone_id: &str, amount: u64, ipfs_hash: &str) -> Value {
    json!({
        "projectId": project_id,
        "milestones": [{
            "milestoneId": milestone_id,
            "status": "VERIFIED",
            "description": "Phase 1 completion",
            "paymentAmount": amount,
            "invoiceProof": {"ipfsHash": ipfs_hash}
        }]
    })
}
