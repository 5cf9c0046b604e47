//! Interfaces of the collaborators this core consumes.
//!
//! The execution engine, the provider's outbound API, media storage and QR
//! decoding all live elsewhere; the pipeline only sees these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::execution::Execution;
use super::message::CanonicalMessage;
use super::validation::ValidationOutcome;
use super::workflow::{FormStatus, Tenant, WorkflowDefinition};
use crate::types::{ExternalMessageId, FormInstanceId, SenderId};
use crate::CoreError;

/// Judges whether a reply satisfies a waiting step
#[async_trait]
pub trait Validator: Send + Sync {
    /// Name recorded on validation records
    fn kind(&self) -> &str;

    /// Validate `input` for the step at `step_index` of `execution`
    async fn validate(
        &self,
        input: &str,
        execution: &Execution,
        step_index: u32,
    ) -> Result<ValidationOutcome, CoreError>;
}

/// Media downloaded from the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    /// Raw bytes
    pub bytes: Vec<u8>,

    /// MIME type reported by the provider
    pub mime_type: String,
}

/// Downloads provider-hosted media
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch a media object with the tenant's credentials
    async fn fetch(&self, tenant: &Tenant, media_id: &str) -> Result<FetchedMedia, CoreError>;
}

/// Extracts an encoded value from image bytes
#[async_trait]
pub trait QrDecoder: Send + Sync {
    /// Decode the first QR code found, `None` if the image holds none
    async fn decode(&self, image: &[u8]) -> Result<Option<String>, CoreError>;
}

/// What the engine receives when a paused execution continues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResumeInput {
    /// A validated reply; the step is still flagged waiting for the engine to transition
    Reply {
        /// The reply
        message: CanonicalMessage,
        /// Validator output
        processed_data: Option<Value>,
    },
    /// A decoded QR code; the step has already been completed
    QrCode {
        /// The image message
        message: CanonicalMessage,
        /// Decoded value
        value: String,
    },
    /// An approval decision on a form
    FormDecision {
        /// Decided form
        form_instance_id: FormInstanceId,
        /// Decision
        status: FormStatus,
    },
}

/// Entry points of the external workflow execution engine
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Start a freshly created execution of `workflow`
    async fn start(
        &self,
        workflow: &WorkflowDefinition,
        execution: &Execution,
    ) -> Result<(), CoreError>;

    /// Continue a paused execution
    async fn resume(&self, execution: &Execution, input: ResumeInput) -> Result<(), CoreError>;
}

/// A reply button
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonOption {
    /// Identifier echoed back when tapped
    pub id: String,
    /// Label
    pub title: String,
}

/// A list row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRow {
    /// Identifier echoed back when selected
    pub id: String,
    /// Row title
    pub title: String,
    /// Optional description
    pub description: Option<String>,
}

/// Acknowledgement of an outbound send
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentMessage {
    /// Provider message ID, when the provider returned one
    pub external_id: Option<ExternalMessageId>,
}

/// Outbound provider API
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send plain text
    async fn send_text(
        &self,
        tenant: &Tenant,
        to: &SenderId,
        body: &str,
    ) -> Result<SentMessage, CoreError>;

    /// Send a message with reply buttons
    async fn send_buttons(
        &self,
        tenant: &Tenant,
        to: &SenderId,
        body: &str,
        buttons: &[ButtonOption],
    ) -> Result<SentMessage, CoreError>;

    /// Send a list picker
    async fn send_list(
        &self,
        tenant: &Tenant,
        to: &SenderId,
        body: &str,
        button_label: &str,
        rows: &[ListRow],
    ) -> Result<SentMessage, CoreError>;
}
