//! Domain models for the milestone auditor
//!
//! Registry records (projects, milestones, evidence references) as the auditor
//! sees them, plus the flag it sends back.

mod project;
mod types;

pub use project::*;
pub use types::*;
pub(crate) use types::nullable_vec;
