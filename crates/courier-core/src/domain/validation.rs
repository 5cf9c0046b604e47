//! Validation configuration and the append-only validation record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::ExecutionId;

/// Validator configured on a waiting step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorKind {
    /// Any non-empty text, optionally length-bounded
    Text {
        /// Minimum length in characters
        #[serde(default)]
        min_len: Option<usize>,
        /// Maximum length in characters
        #[serde(default)]
        max_len: Option<usize>,
    },
    /// A decimal number, optionally bounded
    Number {
        /// Inclusive lower bound
        #[serde(default)]
        min: Option<f64>,
        /// Inclusive upper bound
        #[serde(default)]
        max: Option<f64>,
    },
    /// An email address
    Email,
    /// A phone number (digits, optional leading +)
    Phone,
    /// Text matching a regular expression
    Pattern {
        /// Regular expression the whole input must match
        regex: String,
    },
    /// One of a fixed set of options
    Choice {
        /// Accepted options, matched case-insensitively or by 1-based index
        options: Vec<String>,
    },
    /// A validator registered by name
    Custom {
        /// Registry name
        name: String,
    },
}

impl ValidatorKind {
    /// Stable name recorded on validation records
    pub fn name(&self) -> &str {
        match self {
            ValidatorKind::Text { .. } => "text",
            ValidatorKind::Number { .. } => "number",
            ValidatorKind::Email => "email",
            ValidatorKind::Phone => "phone",
            ValidatorKind::Pattern { .. } => "pattern",
            ValidatorKind::Choice { .. } => "choice",
            ValidatorKind::Custom { name } => name,
        }
    }
}

impl Default for ValidatorKind {
    fn default() -> Self {
        ValidatorKind::Text {
            min_len: None,
            max_len: None,
        }
    }
}

/// Validator kind name used for QR-code attempts
pub const QR_CODE_VALIDATOR: &str = "qr_code";

/// What a validator concluded about one reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the reply satisfies the step
    pub is_valid: bool,

    /// Suggestion for the user when invalid
    pub error_message: Option<String>,

    /// Normalised value when valid
    pub processed_data: Option<Value>,
}

impl ValidationOutcome {
    /// A passing outcome carrying the normalised value
    pub fn valid(processed: Value) -> Self {
        Self {
            is_valid: true,
            error_message: None,
            processed_data: Some(processed),
        }
    }

    /// A failing outcome with a suggestion
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
            processed_data: None,
        }
    }
}

/// One inbound attempt against a waiting step. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// Record ID
    pub id: String,

    /// Execution the attempt belongs to
    pub execution_id: ExecutionId,

    /// Step that was waiting
    pub step_index: u32,

    /// Raw text (or caption) the user sent
    pub raw_input: String,

    /// Media ID for image attempts
    pub media_ref: Option<String>,

    /// Outcome
    pub is_valid: bool,

    /// Error shown to the user, if any
    pub error_message: Option<String>,

    /// Normalised or decoded data
    pub processed_data: Option<Value>,

    /// Name of the validator that judged the attempt
    pub validator_kind: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ValidationRecord {
    /// Build a record from a validator outcome
    pub fn from_outcome(
        execution_id: ExecutionId,
        step_index: u32,
        raw_input: &str,
        media_ref: Option<String>,
        validator_kind: &str,
        outcome: &ValidationOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            execution_id,
            step_index,
            raw_input: raw_input.to_string(),
            media_ref,
            is_valid: outcome.is_valid,
            error_message: outcome.error_message.clone(),
            processed_data: outcome.processed_data.clone(),
            validator_kind: validator_kind.to_string(),
            created_at: Utc::now(),
        }
    }
}
