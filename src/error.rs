//! Error types for the milestone auditor

use thiserror::Error;

/// Errors raised anywhere in the audit pipeline.
///
/// Each variant maps to a failure scope: the scheduler aborts a cycle only on a
/// failed public listing, a project on a failed detail fetch, and a single
/// milestone on everything else.
#[derive(Error, Debug)]
pub enum AuditError {
    /// Credentials rejected or credential no longer accepted
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport failure or unexpected HTTP status
    #[error("network error during {operation}: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },

    /// Content identifier could not be resolved to a document
    #[error("evidence {content_id} unavailable: {reason}")]
    EvidenceUnavailable { content_id: String, reason: String },

    /// OCR engine failure
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl AuditError {
    pub fn network(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Network {
            operation,
            message: message.into(),
        }
    }

    pub fn evidence(content_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EvidenceUnavailable {
            content_id: content_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether the failure came from the registry refusing the credential
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Short, stable label for structured log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::Network { .. } => "network",
            Self::EvidenceUnavailable { .. } => "evidence_unavailable",
            Self::Extraction(_) => "extraction",
            Self::Configuration(_) => "configuration",
        }
    }
}

/// Result type for auditor operations
pub type Result<T> = std::result::Result<T, AuditError>;
