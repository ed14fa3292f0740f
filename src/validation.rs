//! Invoice validation rules
//!
//! Recognized invoice text is reconciled against ledger facts by substring
//! matching over a normalized form. Normalization lower-cases the text and
//! strips whitespace, commas, hyphens, periods, colons and currency symbols,
//! so `"Total: $1,250.00"` and `"total125000"` compare equal.
//!
//! Two rule sets exist:
//!
//! - **Standard**: the ledger payment amount and the project identifier must
//!   both appear in the invoice.
//! - **Strict**: additionally requires generic invoice markers ("invoice",
//!   "client"/"bill to", "date", "total"/"amount").

use std::fmt;
use std::str::FromStr;

use crate::domain::{MilestoneDetail, ProjectId};
use crate::error::AuditError;

/// Prefix of every flag reason produced by the rule engine
pub const FLAG_REASON_PREFIX: &str = "AI FLAG: ";

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₹', '₩', '₦', '₽', '¢'];

/// Marker groups required in strict mode; any one alternative satisfies a group.
const INVOICE_MARKERS: &[&[&str]] = &[
    &["invoice"],
    &["client", "bill to"],
    &["date"],
    &["total", "amount"],
];

/// Normalize text for substring matching.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !is_stripped(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| !is_stripped(*c))
        .collect()
}

fn is_stripped(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '-' | '.' | ':') || CURRENCY_SYMBOLS.contains(&c)
}

/// Validation rule set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    /// Amount and project identifier only
    #[default]
    Standard,
    /// Amount, project identifier and generic invoice markers
    Strict,
}

impl fmt::Display for Strictness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strictness::Standard => write!(f, "standard"),
            Strictness::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for Strictness {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Strictness::Standard),
            "strict" => Ok(Strictness::Strict),
            other => Err(AuditError::Configuration(format!(
                "unknown strictness {other:?}, expected \"standard\" or \"strict\""
            ))),
        }
    }
}

/// A single failed rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The ledger payment amount does not appear in the invoice
    AmountNotFound { amount: String },
    /// The ledger record carries no payment amount to check against
    AmountMissing,
    /// The project identifier does not appear in the invoice
    ProjectIdNotFound { project_id: String },
    /// A generic invoice marker is absent (strict mode)
    MarkerNotFound { marker: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmountNotFound { amount } => {
                write!(f, "amount {amount} not found in invoice text.")
            }
            Self::AmountMissing => write!(f, "ledger record has no payment amount to verify."),
            Self::ProjectIdNotFound { project_id } => {
                write!(f, "project id {project_id} not found in invoice text.")
            }
            Self::MarkerNotFound { marker } => {
                write!(f, "invoice marker \"{marker}\" not found.")
            }
        }
    }
}

/// Join all failures into a single flag reason
pub fn flag_reason(errors: &[ValidationError]) -> String {
    let details = errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    format!("{FLAG_REASON_PREFIX}{details}")
}

/// Outcome of validating one invoice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Pass,
    Flag {
        errors: Vec<ValidationError>,
        reason: String,
    },
}

impl Decision {
    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        if errors.is_empty() {
            Decision::Pass
        } else {
            let reason = flag_reason(&errors);
            Decision::Flag { errors, reason }
        }
    }
}

/// Decides pass/fail for a milestone's invoice text
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine {
    strictness: Strictness,
}

impl RuleEngine {
    pub fn new(strictness: Strictness) -> Self {
        Self { strictness }
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    /// Run every rule and collect the failures, one per rule.
    pub fn validate(
        &self,
        extracted_text: &str,
        milestone: &MilestoneDetail,
        project_id: &ProjectId,
    ) -> Vec<ValidationError> {
        let text = normalize(extracted_text);
        let mut errors = Vec::new();

        match &milestone.payment_amount {
            Some(amount) if contains_normalized(&text, amount.as_str()) => {}
            Some(amount) => errors.push(ValidationError::AmountNotFound {
                amount: amount.to_string(),
            }),
            None => errors.push(ValidationError::AmountMissing),
        }

        if !contains_normalized(&text, project_id.as_str()) {
            errors.push(ValidationError::ProjectIdNotFound {
                project_id: project_id.to_string(),
            });
        }

        if self.strictness == Strictness::Strict {
            for group in INVOICE_MARKERS {
                if !group.iter().any(|marker| contains_normalized(&text, marker)) {
                    errors.push(ValidationError::MarkerNotFound {
                        marker: group.join("\" or \""),
                    });
                }
            }
        }

        errors
    }

    /// Validate and turn the failures into a decision
    pub fn decide(
        &self,
        extracted_text: &str,
        milestone: &MilestoneDetail,
        project_id: &ProjectId,
    ) -> Decision {
        Decision::from_errors(self.validate(extracted_text, milestone, project_id))
    }
}

/// `needle` (normalized here) occurs in the already-normalized `haystack`.
///
/// An expected value that normalizes to nothing never matches.
fn contains_normalized(haystack: &str, needle: &str) -> bool {
    let needle = normalize(needle);
    !needle.is_empty() && haystack.contains(&needle)
}
