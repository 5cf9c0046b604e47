//!
//! Inbound callback pipeline
//!
//! tenant lookup → extraction → (status processing | dedup check-and-mark →
//! routing). Every call ends in a [`WebhookAck`]; nothing escapes as an error
//! or a panic, so the transport can always acknowledge the provider quickly.
//! When routing fails after the message was marked, the mark is removed so the
//! provider's retry is processed.
//!

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::dedup::{Deduplicator, LedgerStats};
use super::delivery_status::DeliveryStatusProcessor;
use super::extractor;
use super::messenger::Messenger;
use super::resolver::{ResolveOutcome, WaitingStateResolver};
use super::router::{RouteOutcome, Router};
use super::validators::ValidatorRegistry;
use crate::config::DispatchConfig;
use crate::domain::collaborators::{ExecutionEngine, MediaFetcher, MessageSender, QrDecoder};
use crate::domain::message::{CanonicalMessage, InboundEvent};
use crate::domain::repository::{
    DeliveryRepository, ExecutionStore, FormRepository, TenantRepository,
    ValidationRecordRepository, WorkflowRepository,
};
use crate::domain::workflow::{FormDecision, Tenant};
use crate::types::{ExecutionId, ExternalMessageId, WorkflowId};
use crate::CoreError;

/// What happened to one callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Malformed or unsupported payload, acknowledged as a no-op
    Ignored {
        /// Why it was ignored
        reason: String,
    },
    /// Already processed within the retention window
    Duplicate {
        /// Provider message ID
        external_id: ExternalMessageId,
    },
    /// Routing token does not resolve to a tenant
    TenantNotFound,
    /// Status callbacks applied
    StatusesProcessed {
        /// Events that changed a recipient
        applied: usize,
        /// Events for untracked messages
        untracked: usize,
    },
    /// Menu sent
    MenuSent {
        /// Entries offered
        options: usize,
    },
    /// New execution started from the menu
    ExecutionStarted {
        /// New execution
        execution_id: ExecutionId,
        /// Its workflow
        workflow_id: WorkflowId,
    },
    /// Waiting execution resumed
    ExecutionResumed {
        /// Resumed execution
        execution_id: ExecutionId,
    },
    /// Reply rejected or re-prompted; the execution keeps waiting
    AwaitingValidInput {
        /// Waiting execution
        execution_id: ExecutionId,
    },
    /// Execution awaits a form decision
    ApprovalPending {
        /// Waiting execution
        execution_id: ExecutionId,
    },
    /// A collaborator or store failed; the user got an apology
    Failed {
        /// Error description
        error: String,
    },
    /// Processing panicked
    UnexpectedDefect {
        /// Panic description
        detail: String,
    },
}

/// Acknowledgement returned to the transport for every callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookAck {
    /// False for tenant misses and processing failures
    pub success: bool,
    /// Details
    pub outcome: WebhookOutcome,
}

impl WebhookAck {
    fn ok(outcome: WebhookOutcome) -> Self {
        Self {
            success: true,
            outcome,
        }
    }

    fn failed(outcome: WebhookOutcome) -> Self {
        Self {
            success: false,
            outcome,
        }
    }
}

impl From<RouteOutcome> for WebhookOutcome {
    fn from(outcome: RouteOutcome) -> Self {
        match outcome {
            RouteOutcome::MenuSent { options, .. } => WebhookOutcome::MenuSent { options },
            RouteOutcome::Started {
                execution_id,
                workflow_id,
            } => WebhookOutcome::ExecutionStarted {
                execution_id,
                workflow_id,
            },
            RouteOutcome::Resolved(ResolveOutcome::Resumed { execution_id }) => {
                WebhookOutcome::ExecutionResumed { execution_id }
            }
            RouteOutcome::Resolved(ResolveOutcome::Rejected { execution_id })
            | RouteOutcome::Resolved(ResolveOutcome::Reprompted { execution_id }) => {
                WebhookOutcome::AwaitingValidInput { execution_id }
            }
            RouteOutcome::Resolved(ResolveOutcome::ApprovalPending { execution_id }) => {
                WebhookOutcome::ApprovalPending { execution_id }
            }
            // The router never returns this; it falls through to the menu flow
            RouteOutcome::Resolved(ResolveOutcome::NoWaitingStep) => {
                WebhookOutcome::Ignored {
                    reason: "no waiting step".to_string(),
                }
            }
        }
    }
}

/// Everything the pipeline depends on
pub struct Collaborators {
    /// Tenant lookup by routing token
    pub tenants: Arc<dyn TenantRepository>,
    /// Menu workflows
    pub workflows: Arc<dyn WorkflowRepository>,
    /// Executions and step executions
    pub executions: Arc<dyn ExecutionStore>,
    /// Validation log
    pub records: Arc<dyn ValidationRecordRepository>,
    /// Form instances
    pub forms: Arc<dyn FormRepository>,
    /// Delivery tracking
    pub deliveries: Arc<dyn DeliveryRepository>,
    /// Outbound provider API
    pub sender: Arc<dyn MessageSender>,
    /// Media download
    pub media: Arc<dyn MediaFetcher>,
    /// QR decoding
    pub qr_decoder: Arc<dyn QrDecoder>,
    /// Execution engine
    pub engine: Arc<dyn ExecutionEngine>,
    /// Reply validators
    pub validators: Arc<ValidatorRegistry>,
    /// Idempotency ledger
    pub dedup: Arc<dyn Deduplicator>,
}

/// Entry point for inbound callbacks and form decisions
pub struct WebhookService {
    tenants: Arc<dyn TenantRepository>,
    dedup: Arc<dyn Deduplicator>,
    router: Arc<Router>,
    resolver: Arc<WaitingStateResolver>,
    statuses: Arc<DeliveryStatusProcessor>,
    messenger: Arc<Messenger>,
    config: Arc<DispatchConfig>,
}

impl WebhookService {
    /// Wire the pipeline from its collaborators
    pub fn assemble(collaborators: Collaborators, config: DispatchConfig) -> Self {
        let config = Arc::new(config);
        let messenger = Arc::new(Messenger::new(collaborators.sender, config.clone()));
        let resolver = Arc::new(WaitingStateResolver::new(
            collaborators.executions.clone(),
            collaborators.records,
            collaborators.forms,
            collaborators.validators,
            collaborators.media,
            collaborators.qr_decoder,
            collaborators.engine.clone(),
            messenger.clone(),
            config.clone(),
        ));
        let router = Arc::new(Router::new(
            collaborators.executions,
            collaborators.workflows,
            resolver.clone(),
            collaborators.engine,
            messenger.clone(),
            config.clone(),
        ));

        Self {
            tenants: collaborators.tenants,
            dedup: collaborators.dedup,
            router,
            resolver,
            statuses: Arc::new(DeliveryStatusProcessor::new(collaborators.deliveries)),
            messenger,
            config,
        }
    }

    /// Dispatch configuration in use
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dedup ledger statistics
    pub async fn ledger_stats(&self) -> LedgerStats {
        self.dedup.stats().await
    }

    /// Handle one raw callback for the tenant behind `tenant_token`
    ///
    /// A panic anywhere in processing becomes an `UnexpectedDefect` ack.
    pub async fn handle(&self, tenant_token: &str, payload: &Value) -> WebhookAck {
        match AssertUnwindSafe(self.process(tenant_token, payload))
            .catch_unwind()
            .await
        {
            Ok(ack) => ack,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(%detail, "panic while handling webhook");
                WebhookAck::failed(WebhookOutcome::UnexpectedDefect { detail })
            }
        }
    }

    async fn process(&self, tenant_token: &str, payload: &Value) -> WebhookAck {
        let tenant = match self.tenants.find_by_routing_token(tenant_token).await {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                info!("webhook for unknown routing token");
                return WebhookAck::failed(WebhookOutcome::TenantNotFound);
            }
            Err(e) => {
                error!(error = %e, "tenant lookup failed");
                return WebhookAck::failed(WebhookOutcome::Failed {
                    error: e.to_string(),
                });
            }
        };

        let span = info_span!("webhook", tenant_id = %tenant.id);
        async move {
            match extractor::extract(payload) {
                InboundEvent::Unrecognized { reason } => {
                    debug!(%reason, "ignoring unrecognized payload");
                    WebhookAck::ok(WebhookOutcome::Ignored { reason })
                }
                InboundEvent::StatusBatch(events) => match self.statuses.process(&events).await {
                    Ok(report) => WebhookAck::ok(WebhookOutcome::StatusesProcessed {
                        applied: report.applied,
                        untracked: report.untracked,
                    }),
                    Err(e) => {
                        warn!(error = %e, "status processing failed");
                        WebhookAck::failed(WebhookOutcome::Failed {
                            error: e.to_string(),
                        })
                    }
                },
                InboundEvent::Message(message) => self.handle_message(&tenant, message).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn handle_message(&self, tenant: &Tenant, message: CanonicalMessage) -> WebhookAck {
        let external_id = message.external_id.clone();
        if !self.dedup.check_and_mark(&external_id).await {
            info!(external_id = %external_id, "duplicate delivery, skipping");
            return WebhookAck::ok(WebhookOutcome::Duplicate { external_id });
        }

        let routed = AssertUnwindSafe(self.router.route(tenant, &message))
            .catch_unwind()
            .await;

        let outcome = match routed {
            Ok(Ok(outcome)) => {
                debug!(external_id = %external_id, outcome = ?outcome, "message routed");
                return WebhookAck::ok(outcome.into());
            }
            Ok(Err(e)) => {
                if e.is_downstream() {
                    warn!(external_id = %external_id, error = %e, "downstream failure while routing");
                } else {
                    error!(external_id = %external_id, error = %e, "routing failed");
                }
                WebhookOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(external_id = %external_id, %detail, "panic while routing");
                WebhookOutcome::UnexpectedDefect { detail }
            }
        };

        self.dedup.unmark(&external_id).await;
        if let Err(e) = self
            .messenger
            .text(tenant, &message.sender_id, &self.config.apology_message)
            .await
        {
            warn!(recipient = %message.sender_id, error = %e, "failed to send apology");
        }
        WebhookAck::failed(outcome)
    }

    /// Apply an out-of-band form decision
    pub async fn decide_form(&self, decision: &FormDecision) -> Result<ResolveOutcome, CoreError> {
        let span = info_span!("form_decision", form_instance_id = %decision.form_instance_id);
        self.resolver
            .resolve_form_decision(decision)
            .instrument(span)
            .await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
