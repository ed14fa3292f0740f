//! Identifier and value types shared across the audit pipeline

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Registry project identifier (e.g. `HWY-001`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Milestone identifier, unique within its project
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MilestoneId(pub String);

impl MilestoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MilestoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MilestoneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Content identifier of an evidence document in content-addressed storage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A bare CID, optionally followed by a path inside the CID directory
    /// (`<cid>/invoice.png`).
    ///
    /// The CID itself is alphanumeric. Path segments may also contain `-`,
    /// `_` and `.`, but must not be empty, `.` or `..`. Query strings and
    /// fragments are never part of an identifier.
    pub fn is_well_formed(&self) -> bool {
        let mut segments = self.0.split('/');
        let cid_ok = segments
            .next()
            .is_some_and(|cid| !cid.is_empty() && cid.chars().all(|c| c.is_ascii_alphanumeric()));

        cid_ok
            && segments.all(|segment| {
                !segment.is_empty()
                    && segment != "."
                    && segment != ".."
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            })
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Milestone lifecycle status as reported by the registry.
///
/// Only `Verified` milestones are audited. Statuses this crate does not know
/// about are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MilestoneStatus {
    Pending,
    Verified,
    Paid,
    Flagged,
    Other(String),
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
            Self::Paid => "PAID",
            Self::Flagged => "FLAGGED",
            Self::Other(s) => s,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

impl From<String> for MilestoneStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => Self::Pending,
            "VERIFIED" => Self::Verified,
            "PAID" => Self::Paid,
            "FLAGGED" => Self::Flagged,
            _ => Self::Other(s),
        }
    }
}

impl From<MilestoneStatus> for String {
    fn from(status: MilestoneStatus) -> Self {
        match status {
            MilestoneStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ledger payment amount, carried as its canonical decimal text.
///
/// The registry may send the amount as a JSON number or a string. Whole
/// numbers render without a fractional part (`500`, never `500.0`) so the text
/// matches what an invoice would print.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PaymentAmount(String);

impl PaymentAmount {
    pub fn new(amount: impl Into<String>) -> Self {
        Self(amount.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_number(n: &serde_json::Number) -> Self {
        if let Some(i) = n.as_i64() {
            return Self(i.to_string());
        }
        if let Some(u) = n.as_u64() {
            return Self(u.to_string());
        }
        match n.as_f64() {
            Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
                Self(format!("{}", f as i64))
            }
            Some(f) => Self(f.to_string()),
            None => Self(n.to_string()),
        }
    }
}

impl fmt::Display for PaymentAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for PaymentAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => Ok(Self::from_number(&n)),
            serde_json::Value::String(s) => Ok(Self(s)),
            other => Err(serde::de::Error::custom(format!(
                "expected payment amount as number or string, got {other}"
            ))),
        }
    }
}

/// Deserialize a JSON array that may be `null` or absent into an empty `Vec`
pub(crate) fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
