//! Delivery-status processor
//!
//! Applies provider status callbacks to tracked recipients and re-derives the
//! owning batch aggregate after every change.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::delivery::BatchAggregate;
use crate::domain::message::StatusEvent;
use crate::domain::repository::DeliveryRepository;
use crate::types::BatchId;
use crate::CoreError;

/// Counts of what one status batch did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Events that changed a recipient's state
    pub applied: usize,
    /// Events for recipients not tracked under any batch
    pub untracked: usize,
    /// Events that did not change state
    pub ignored: usize,
    /// Batches whose aggregate was re-derived
    pub batches: Vec<BatchId>,
}

/// Drives recipient delivery states from status callbacks
pub struct DeliveryStatusProcessor {
    repository: Arc<dyn DeliveryRepository>,
}

impl DeliveryStatusProcessor {
    /// Create a processor
    pub fn new(repository: Arc<dyn DeliveryRepository>) -> Self {
        Self { repository }
    }

    /// Process a batch of status events in arrival order
    pub async fn process(&self, events: &[StatusEvent]) -> Result<StatusReport, CoreError> {
        let mut report = StatusReport::default();
        let mut touched = BTreeSet::new();

        for event in events {
            let Some(mut state) = self
                .repository
                .find_recipient(&event.external_message_id, &event.recipient_id)
                .await?
            else {
                debug!(
                    external_id = %event.external_message_id,
                    recipient = %event.recipient_id,
                    status = ?event.status,
                    "status for untracked message, skipping"
                );
                report.untracked += 1;
                continue;
            };

            if !state.apply(event) {
                debug!(
                    external_id = %event.external_message_id,
                    current = ?state.status,
                    reported = ?event.status,
                    "status does not advance recipient"
                );
                report.ignored += 1;
                continue;
            }

            self.repository.save_recipient(&state).await?;
            report.applied += 1;

            let recipients = self
                .repository
                .list_batch_recipients(&state.batch_id)
                .await?;
            let aggregate = BatchAggregate::derive(state.batch_id.clone(), &recipients);
            self.repository.save_aggregate(&aggregate).await?;

            debug!(
                batch_id = %aggregate.batch_id,
                total = aggregate.total,
                success = aggregate.success_count,
                failed = aggregate.failed_count,
                status = ?aggregate.status,
                "batch aggregate updated"
            );
            touched.insert(state.batch_id);
        }

        report.batches = touched.into_iter().collect();
        info!(
            applied = report.applied,
            untracked = report.untracked,
            ignored = report.ignored,
            "processed status batch"
        );
        Ok(report)
    }
}
