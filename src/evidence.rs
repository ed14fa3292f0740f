//! Evidence retrieval from content-addressed storage
//!
//! Invoice documents are resolved through a fixed gateway as
//! `GET {gateway}/{contentId}`. Transient failures (transport errors, 5xx,
//! 429) are retried briefly; anything else fails the single milestone.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::domain::ContentId;
use crate::error::{AuditError, Result};
use crate::infra::{Retry, RetryConfig};

/// Raw evidence bytes, held only while one milestone is audited
#[derive(Clone, PartialEq, Eq)]
pub struct EvidenceDocument {
    pub content_id: ContentId,
    pub bytes: Vec<u8>,
}

impl EvidenceDocument {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for EvidenceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceDocument")
            .field("content_id", &self.content_id)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Source of evidence documents
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn fetch(&self, content_id: &ContentId) -> Result<EvidenceDocument>;
}

/// Failure of one download attempt
#[derive(Debug)]
enum FetchAttemptError {
    Transient(String),
    Permanent(String),
}

impl std::fmt::Display for FetchAttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchAttemptError::Transient(msg) | FetchAttemptError::Permanent(msg) => {
                write!(f, "{msg}")
            }
        }
    }
}

/// HTTP gateway implementation of [`EvidenceSource`]
pub struct GatewayEvidenceFetcher {
    gateway_base_url: String,
    client: Client,
    max_bytes: usize,
    retry: Retry,
}

impl GatewayEvidenceFetcher {
    pub fn new(gateway_base_url: impl Into<String>, timeout: Duration, max_bytes: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AuditError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            gateway_base_url: gateway_base_url.into().trim_end_matches('/').to_string(),
            client,
            max_bytes,
            retry: Retry::new(RetryConfig::evidence_gateway()),
        })
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Retry::new(config);
        self
    }

    pub fn url_for(&self, content_id: &ContentId) -> String {
        format!("{}/{}", self.gateway_base_url, content_id.as_str())
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<Vec<u8>, FetchAttemptError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchAttemptError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let msg = format!("gateway returned HTTP {status}");
            return Err(
                if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                    FetchAttemptError::Transient(msg)
                } else {
                    FetchAttemptError::Permanent(msg)
                },
            );
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(self.too_large(&len.to_string()));
            }
        }

        // Streamed so a body without Content-Length stops at the ceiling.
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchAttemptError::Transient(e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large("more than"));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    fn too_large(&self, size: &str) -> FetchAttemptError {
        FetchAttemptError::Permanent(format!(
            "document of {size} bytes exceeds limit of {} bytes",
            self.max_bytes
        ))
    }
}

#[async_trait]
impl EvidenceSource for GatewayEvidenceFetcher {
    async fn fetch(&self, content_id: &ContentId) -> Result<EvidenceDocument> {
        if !content_id.is_well_formed() {
            return Err(AuditError::evidence(
                content_id.as_str(),
                "malformed content identifier",
            ));
        }

        let url = self.url_for(content_id);
        debug!(content_id = %content_id, url = %url, "Downloading evidence");

        let outcome = self
            .retry
            .run_with_predicate(
                "evidence_fetch",
                || self.fetch_once(&url),
                |e| matches!(e, FetchAttemptError::Transient(_)),
            )
            .await;

        let bytes = outcome
            .into_result()
            .map_err(|e| AuditError::evidence(content_id.as_str(), e.to_string()))?;

        debug!(content_id = %content_id, bytes = bytes.len(), "Evidence downloaded");
        Ok(EvidenceDocument {
            content_id: content_id.clone(),
            bytes,
        })
    }
}
