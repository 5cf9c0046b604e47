//! Per-recipient delivery state machine and batch aggregation.
//!
//! Status callbacks arrive out of order and sometimes skip steps. Transitions
//! therefore backfill missing timestamps instead of rejecting events, and the
//! batch aggregate is always re-derived from the full recipient set.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::message::{ReportedStatus, StatusEvent};
use crate::types::{BatchId, ExternalMessageId, SenderId};

/// Delivery status of one recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Queued, not yet acknowledged by the provider
    Pending,
    /// Accepted by the provider
    Sent,
    /// Reached the device
    Delivered,
    /// Opened
    Read,
    /// Undeliverable
    Failed,
    /// Scheduled for another attempt by the retry scheduler
    Retrying,
}

impl DeliveryStatus {
    /// Counted as a success by the batch aggregate
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Sent | DeliveryStatus::Delivered | DeliveryStatus::Read
        )
    }
}

/// Delivery state per (batch, recipient)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientDeliveryState {
    /// Owning batch
    pub batch_id: BatchId,

    /// Recipient
    pub recipient_id: SenderId,

    /// Provider ID of the message sent to this recipient
    pub external_message_id: ExternalMessageId,

    /// Current status
    pub status: DeliveryStatus,

    /// When the provider accepted the message
    pub sent_at: Option<DateTime<Utc>>,

    /// When it reached the device
    pub delivered_at: Option<DateTime<Utc>>,

    /// When it was read
    pub read_at: Option<DateTime<Utc>>,

    /// When it failed
    pub failed_at: Option<DateTime<Utc>>,

    /// Provider error code
    pub error_code: Option<String>,

    /// Provider error description
    pub error_message: Option<String>,
}

impl RecipientDeliveryState {
    /// A freshly queued recipient
    pub fn pending(
        batch_id: BatchId,
        recipient_id: SenderId,
        external_message_id: ExternalMessageId,
    ) -> Self {
        Self {
            batch_id,
            recipient_id,
            external_message_id,
            status: DeliveryStatus::Pending,
            sent_at: None,
            delivered_at: None,
            read_at: None,
            failed_at: None,
            error_code: None,
            error_message: None,
        }
    }

    /// Apply a status event. Returns whether anything changed.
    pub fn apply(&mut self, event: &StatusEvent) -> bool {
        let at = event.timestamp;
        match event.status {
            ReportedStatus::Sent => {
                if self.status != DeliveryStatus::Pending {
                    return false;
                }
                self.status = DeliveryStatus::Sent;
                self.sent_at = Some(at);
                true
            }
            ReportedStatus::Delivered => {
                if !matches!(self.status, DeliveryStatus::Pending | DeliveryStatus::Sent) {
                    return false;
                }
                self.status = DeliveryStatus::Delivered;
                self.delivered_at = Some(at);
                self.sent_at.get_or_insert(at);
                true
            }
            ReportedStatus::Read => {
                self.status = DeliveryStatus::Read;
                self.read_at = Some(at);
                self.delivered_at.get_or_insert(at);
                self.sent_at.get_or_insert(at);
                true
            }
            ReportedStatus::Failed => {
                self.status = DeliveryStatus::Failed;
                self.failed_at = Some(at);
                self.error_code = event.error_code.clone();
                self.error_message = event.error_message.clone();
                true
            }
        }
    }
}

/// Batch status derived from its recipients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    /// No recipients yet
    Pending,
    /// Some recipients still outstanding
    InProgress,
    /// Every recipient succeeded
    Completed,
    /// Every recipient failed
    Failed,
    /// Mixed successes and failures
    PartiallyFailed,
}

/// Summary of one send batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchAggregate {
    /// Batch
    pub batch_id: BatchId,

    /// Number of recipients
    pub total: usize,

    /// Recipients in Sent, Delivered or Read
    pub success_count: usize,

    /// Recipients in Failed
    pub failed_count: usize,

    /// Derived status
    pub status: BatchStatus,

    /// When the aggregate was last derived
    pub updated_at: DateTime<Utc>,
}

impl BatchAggregate {
    /// Derive the aggregate from the full recipient set
    pub fn derive(batch_id: BatchId, recipients: &[RecipientDeliveryState]) -> Self {
        let total = recipients.len();
        let success_count = recipients.iter().filter(|r| r.status.is_success()).count();
        let failed_count = recipients
            .iter()
            .filter(|r| r.status == DeliveryStatus::Failed)
            .count();

        let status = if total == 0 {
            BatchStatus::Pending
        } else if failed_count == total {
            BatchStatus::Failed
        } else if failed_count > 0 && success_count > 0 {
            BatchStatus::PartiallyFailed
        } else if success_count == total {
            BatchStatus::Completed
        } else {
            BatchStatus::InProgress
        };

        Self {
            batch_id,
            total,
            success_count,
            failed_count,
            status,
            updated_at: Utc::now(),
        }
    }
}
