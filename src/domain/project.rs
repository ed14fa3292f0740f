//! Registry records consumed by the auditor

use serde::{Deserialize, Serialize};

use super::types::{nullable_vec, ContentId, MilestoneId, MilestoneStatus, PaymentAmount, ProjectId};

/// Public, unauthenticated view of a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub project_id: ProjectId,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub milestones: Vec<MilestoneSummary>,
}

impl ProjectSummary {
    /// Milestones eligible for audit: public status is exactly VERIFIED
    pub fn audit_candidates(&self) -> impl Iterator<Item = &MilestoneSummary> {
        self.milestones.iter().filter(|m| m.status.is_verified())
    }
}

/// Public view of a milestone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneSummary {
    pub milestone_id: MilestoneId,
    pub status: MilestoneStatus,
}

/// Invoice evidence reference attached to a milestone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceProof {
    #[serde(default)]
    pub ipfs_hash: Option<ContentId>,
}

/// Privileged milestone record, including ledger payment and evidence reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneDetail {
    pub milestone_id: MilestoneId,
    #[serde(default)]
    pub status: Option<MilestoneStatus>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub payment_amount: Option<PaymentAmount>,
    #[serde(default)]
    pub invoice_proof: Option<InvoiceProof>,
}

impl MilestoneDetail {
    /// Evidence reference, if one has been submitted
    pub fn evidence_id(&self) -> Option<&ContentId> {
        self.invoice_proof
            .as_ref()
            .and_then(|proof| proof.ipfs_hash.as_ref())
            .filter(|id| !id.as_str().trim().is_empty())
    }

    /// The privileged record contradicts a VERIFIED public status.
    ///
    /// A record without a status does not contradict anything.
    pub fn left_verified(&self) -> bool {
        self.status.as_ref().is_some_and(|s| !s.is_verified())
    }
}

/// Privileged project record fetched once per project per cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDetail {
    pub project_id: ProjectId,
    pub milestones: Vec<MilestoneDetail>,
}

impl ProjectDetail {
    pub fn milestone(&self, milestone_id: &MilestoneId) -> Option<&MilestoneDetail> {
        self.milestones
            .iter()
            .find(|m| &m.milestone_id == milestone_id)
    }
}

/// Fraud flag submitted for a milestone whose invoice failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagReport {
    pub project_id: ProjectId,
    pub milestone_id: MilestoneId,
    pub reason: String,
}
