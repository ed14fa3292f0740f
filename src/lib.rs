//! Milestone Auditor Library
//!
//! Autonomous invoice auditor for a project-funding registry. On a fixed
//! interval it scans public projects for VERIFIED milestones, downloads each
//! milestone's invoice from content-addressed storage, extracts its text with
//! OCR, reconciles it against the ledger payment amount and project
//! identifier, and reports a fraud flag when they disagree.
//!
//! ## Modules
//!
//! - [`domain`] - Registry records (projects, milestones, flags)
//! - [`registry`] - Registry API client
//! - [`session`] - Auditor credential and re-authentication
//! - [`scanner`] - Project listing and per-cycle detail memoization
//! - [`evidence`] - Evidence download from the storage gateway
//! - [`extraction`] - OCR engine
//! - [`validation`] - Invoice validation rules
//! - [`reporter`] - Flag submission
//! - [`pipeline`] - One audit cycle
//! - [`scheduler`] - Interval polling with overlap protection
//! - [`infra`] - Retry and graceful shutdown
//! - [`metrics`] - Running audit counters
//! - [`telemetry`] - Structured logging setup

pub mod config;
pub mod domain;
pub mod error;
pub mod evidence;
pub mod extraction;
pub mod infra;
pub mod metrics;
pub mod pipeline;
pub mod registry;
pub mod reporter;
pub mod scanner;
pub mod scheduler;
pub mod service;
pub mod session;
pub mod telemetry;
pub mod validation;

// Re-export commonly used types
pub use config::AuditorConfig;
pub use domain::{
    ContentId, FlagReport, MilestoneDetail, MilestoneId, MilestoneStatus, PaymentAmount,
    ProjectDetail, ProjectId, ProjectSummary,
};
pub use error::{AuditError, Result};
pub use pipeline::{AuditPipeline, CycleReport, MilestoneVerdict};
pub use scheduler::{CycleOutcome, PollScheduler};
pub use validation::{normalize, RuleEngine, Strictness, ValidationError};
