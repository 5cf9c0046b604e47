//!
//! Courier Core - inbound messaging callbacks for the Courier workflow platform
//!
//! This crate holds the domain model, the collaborator and repository
//! interfaces, and the application services that turn provider callbacks into
//! workflow actions: deduplication, extraction, routing, waiting-state
//! resolution and delivery-status tracking.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - entities, state machines and interfaces
pub mod domain;

/// Application services - the callback pipeline
pub mod application;

/// Dispatch configuration
pub mod config;

/// Core identifier types
pub mod types;

/// Error types
pub mod error;

// Re-export key types
pub use config::DispatchConfig;
pub use error::CoreError;
pub use types::{
    BatchId, ExecutionId, ExternalMessageId, FormInstanceId, SenderId, TenantId, WorkflowId,
};

pub use application::dedup::{Deduplicator, InMemoryDeduplicator, LedgerStats};
pub use application::engine_channel::{ChannelExecutionEngine, EngineCommand};
pub use application::extractor::extract;
pub use application::resolver::{ResolveOutcome, WaitingStateResolver};
pub use application::router::{RouteOutcome, Router};
pub use application::validators::ValidatorRegistry;
pub use application::webhook_service::{Collaborators, WebhookAck, WebhookOutcome, WebhookService};

pub use domain::collaborators::{
    ButtonOption, ExecutionEngine, FetchedMedia, ListRow, MediaFetcher, MessageSender, QrDecoder,
    ResumeInput, SentMessage, Validator,
};
pub use domain::delivery::{BatchAggregate, BatchStatus, DeliveryStatus, RecipientDeliveryState};
pub use domain::execution::{Execution, ExecutionStatus, StepExecution, StepStatus, WaitConfig};
pub use domain::message::{
    CanonicalMessage, InboundEvent, MediaRef, MessageKind, ReportedStatus, StatusEvent,
};
pub use domain::repository::{
    DeliveryRepository, ExecutionStore, FormRepository, TenantRepository,
    ValidationRecordRepository, WorkflowRepository,
};
pub use domain::validation::{ValidationOutcome, ValidationRecord, ValidatorKind};
pub use domain::workflow::{FormDecision, FormInstance, FormStatus, Tenant, WorkflowDefinition};
