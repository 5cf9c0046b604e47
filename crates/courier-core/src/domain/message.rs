//! Canonical inbound events produced by the extractor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ExternalMessageId, SenderId};

/// Kind of user message after extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Typed text
    Text,
    /// Reply button or template quick-reply button
    InteractiveButton,
    /// List row selection
    InteractiveList,
    /// Image, with optional caption
    Image,
}

/// Reference to provider-hosted media
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    /// Provider media ID
    pub media_id: String,

    /// MIME type announced by the provider, if any
    pub mime_type: Option<String>,
}

/// Normalised user message
///
/// For interactive replies `text_body` holds the selection identifier, for
/// images it holds the caption (empty when absent), so routing never looks
/// at the raw payload shape again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Unique per provider delivery attempt
    pub external_id: ExternalMessageId,

    /// Who sent it
    pub sender_id: SenderId,

    /// Profile name from the envelope's contacts, if present
    pub contact_name: Option<String>,

    /// Message kind
    pub kind: MessageKind,

    /// Text, selection identifier, or caption
    pub text_body: String,

    /// Media reference for images
    pub media_ref: Option<MediaRef>,

    /// Provider timestamp
    pub timestamp: DateTime<Utc>,
}

impl CanonicalMessage {
    /// Text body with surrounding whitespace removed
    pub fn trimmed_text(&self) -> &str {
        self.text_body.trim()
    }

    /// True when there is no usable text
    pub fn has_empty_text(&self) -> bool {
        self.trimmed_text().is_empty()
    }
}

/// Delivery status reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedStatus {
    /// Accepted by the provider
    Sent,
    /// Reached the device
    Delivered,
    /// Opened by the recipient
    Read,
    /// Could not be delivered
    Failed,
}

impl ReportedStatus {
    /// Parse the provider's status string
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "sent" => Some(ReportedStatus::Sent),
            "delivered" => Some(ReportedStatus::Delivered),
            "read" => Some(ReportedStatus::Read),
            "failed" => Some(ReportedStatus::Failed),
            _ => None,
        }
    }
}

/// One entry of a status callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// ID of the message we sent
    pub external_message_id: ExternalMessageId,

    /// New status
    pub status: ReportedStatus,

    /// When the provider observed it
    pub timestamp: DateTime<Utc>,

    /// Recipient the status applies to
    pub recipient_id: SenderId,

    /// Provider error code for failures
    pub error_code: Option<String>,

    /// Provider error description for failures
    pub error_message: Option<String>,
}

/// Result of one extraction pass over a raw envelope
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A user message
    Message(CanonicalMessage),

    /// Delivery-status callbacks for previously sent messages
    StatusBatch(Vec<StatusEvent>),

    /// Malformed or unsupported payload
    Unrecognized {
        /// Why extraction gave up
        reason: String,
    },
}

impl InboundEvent {
    /// Build an `Unrecognized` event
    pub fn unrecognized(reason: impl Into<String>) -> Self {
        InboundEvent::Unrecognized {
            reason: reason.into(),
        }
    }
}
