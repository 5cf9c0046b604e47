//! Shared fixtures for the pipeline integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use mockall::mock;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use courier_core::domain::repository::memory::{
    MemoryDeliveryRepository, MemoryExecutionStore, MemoryFormRepository, MemoryTenantRepository,
    MemoryValidationRecordRepository, MemoryWorkflowRepository,
};
use courier_core::{
    BatchAggregate, BatchId, ButtonOption, ChannelExecutionEngine, Collaborators, CoreError,
    DeliveryRepository, DispatchConfig, EngineCommand, Execution, ExecutionEngine,
    ExecutionStatus, ExecutionStore, ExternalMessageId, FetchedMedia, InMemoryDeduplicator,
    ListRow, MediaFetcher, MessageSender, QrDecoder, RecipientDeliveryState, ResumeInput,
    SenderId, SentMessage, StepExecution, Tenant, TenantId, ValidatorKind, ValidatorRegistry,
    WaitConfig, WebhookService, WorkflowDefinition, WorkflowId,
};

pub const TOKEN: &str = "tok-acme";
pub const SENDER: &str = "5511999990000";

/// Route pipeline logs to the test harness; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

mock! {
    pub Media {}

    #[async_trait]
    impl MediaFetcher for Media {
        async fn fetch(&self, tenant: &Tenant, media_id: &str) -> Result<FetchedMedia, CoreError>;
    }
}

mock! {
    pub Qr {}

    #[async_trait]
    impl QrDecoder for Qr {
        async fn decode(&self, image: &[u8]) -> Result<Option<String>, CoreError>;
    }
}

mock! {
    pub Engine {}

    #[async_trait]
    impl ExecutionEngine for Engine {
        async fn start(&self, workflow: &WorkflowDefinition, execution: &Execution) -> Result<(), CoreError>;
        async fn resume(&self, execution: &Execution, input: ResumeInput) -> Result<(), CoreError>;
    }
}

mock! {
    pub Deliveries {}

    #[async_trait]
    impl DeliveryRepository for Deliveries {
        async fn find_recipient(
            &self,
            external_message_id: &ExternalMessageId,
            recipient_id: &SenderId,
        ) -> Result<Option<RecipientDeliveryState>, CoreError>;
        async fn save_recipient(&self, state: &RecipientDeliveryState) -> Result<(), CoreError>;
        async fn list_batch_recipients(&self, batch_id: &BatchId) -> Result<Vec<RecipientDeliveryState>, CoreError>;
        async fn save_aggregate(&self, aggregate: &BatchAggregate) -> Result<(), CoreError>;
        async fn find_aggregate(&self, batch_id: &BatchId) -> Result<Option<BatchAggregate>, CoreError>;
    }
}

/// An outbound send captured by [`RecordingSender`]
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text { to: String, body: String },
    Buttons { to: String, body: String, ids: Vec<String> },
    List { to: String, body: String, ids: Vec<String> },
}

/// Sender that records everything it is asked to send
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Outbound>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Text { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn push(&self, outbound: Outbound) -> Result<SentMessage, CoreError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(outbound);
        Ok(SentMessage {
            external_id: Some(format!("wamid.out.{}", sent.len()).into()),
        })
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_text(
        &self,
        _tenant: &Tenant,
        to: &SenderId,
        body: &str,
    ) -> Result<SentMessage, CoreError> {
        self.push(Outbound::Text {
            to: to.to_string(),
            body: body.to_string(),
        })
    }

    async fn send_buttons(
        &self,
        _tenant: &Tenant,
        to: &SenderId,
        body: &str,
        buttons: &[ButtonOption],
    ) -> Result<SentMessage, CoreError> {
        self.push(Outbound::Buttons {
            to: to.to_string(),
            body: body.to_string(),
            ids: buttons.iter().map(|b| b.id.clone()).collect(),
        })
    }

    async fn send_list(
        &self,
        _tenant: &Tenant,
        to: &SenderId,
        body: &str,
        _button_label: &str,
        rows: &[ListRow],
    ) -> Result<SentMessage, CoreError> {
        self.push(Outbound::List {
            to: to.to_string(),
            body: body.to_string(),
            ids: rows.iter().map(|r| r.id.clone()).collect(),
        })
    }
}

pub fn tenant() -> Tenant {
    Tenant {
        id: TenantId("acme".to_string()),
        routing_token: TOKEN.to_string(),
        name: "Acme".to_string(),
        phone_number_id: "1000".to_string(),
        access_token: None,
    }
}

pub fn workflows() -> Vec<WorkflowDefinition> {
    ["Open a ticket", "Customer Support", "Billing"]
        .iter()
        .enumerate()
        .map(|(i, name)| WorkflowDefinition {
            id: WorkflowId(format!("wf{}", i + 1)),
            tenant_id: TenantId("acme".to_string()),
            name: name.to_string(),
            description: None,
            enabled: true,
            webhook_activated: true,
            menu_order: i as i32,
        })
        .collect()
}

pub struct Harness {
    pub service: Arc<WebhookService>,
    pub executions: Arc<MemoryExecutionStore>,
    pub records: Arc<MemoryValidationRecordRepository>,
    pub forms: Arc<MemoryFormRepository>,
    pub deliveries: Arc<MemoryDeliveryRepository>,
    pub sender: Arc<RecordingSender>,
    pub dedup: Arc<InMemoryDeduplicator>,
    pub engine_rx: mpsc::Receiver<EngineCommand>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_capabilities(MockMedia::new(), MockQr::new())
    }

    pub fn with_capabilities(media: MockMedia, qr: MockQr) -> Self {
        Self::assemble(media, qr, None, None)
    }

    /// Pipeline whose engine is `engine` instead of the channel; `engine_rx` stays idle
    pub fn with_engine(engine: MockEngine) -> Self {
        Self::assemble(MockMedia::new(), MockQr::new(), Some(Arc::new(engine)), None)
    }

    /// Pipeline whose delivery store is `deliveries`; the `deliveries` field goes unused
    pub fn with_deliveries(deliveries: MockDeliveries) -> Self {
        Self::assemble(MockMedia::new(), MockQr::new(), None, Some(Arc::new(deliveries)))
    }

    fn assemble(
        media: MockMedia,
        qr: MockQr,
        engine: Option<Arc<dyn ExecutionEngine>>,
        delivery_store: Option<Arc<dyn DeliveryRepository>>,
    ) -> Self {
        init_tracing();
        let executions = Arc::new(MemoryExecutionStore::new());
        let records = Arc::new(MemoryValidationRecordRepository::new());
        let forms = Arc::new(MemoryFormRepository::new());
        let deliveries = Arc::new(MemoryDeliveryRepository::new());
        let sender = Arc::new(RecordingSender::default());
        let dedup = Arc::new(InMemoryDeduplicator::default());
        let (channel, engine_rx) = ChannelExecutionEngine::channel(16);
        let engine = engine.unwrap_or_else(|| Arc::new(channel) as Arc<dyn ExecutionEngine>);
        let delivery_store = delivery_store
            .unwrap_or_else(|| deliveries.clone() as Arc<dyn DeliveryRepository>);

        let service = WebhookService::assemble(
            Collaborators {
                tenants: Arc::new(MemoryTenantRepository::with_tenants(vec![tenant()])),
                workflows: Arc::new(MemoryWorkflowRepository::with_workflows(workflows())),
                executions: executions.clone(),
                records: records.clone(),
                forms: forms.clone(),
                deliveries: delivery_store,
                sender: sender.clone(),
                media: Arc::new(media),
                qr_decoder: Arc::new(qr),
                engine,
                validators: Arc::new(ValidatorRegistry::new()),
                dedup: dedup.clone(),
            },
            DispatchConfig::default(),
        );

        Self {
            service: Arc::new(service),
            executions,
            records,
            forms,
            deliveries,
            sender,
            dedup,
            engine_rx,
        }
    }

    /// Drain every engine command submitted so far
    pub fn engine_commands(&mut self) -> Vec<EngineCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.engine_rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// Seed an execution paused on `waiting_step`, with the header hint set to `hint`
    pub async fn seed_waiting(
        &self,
        status: ExecutionStatus,
        waiting_step: u32,
        hint: u32,
        validator: ValidatorKind,
    ) -> Execution {
        let mut execution = Execution::new(
            WorkflowId("wf1".to_string()),
            TenantId("acme".to_string()),
            SenderId(SENDER.to_string()),
        );
        execution
            .suspend_for_input(hint, SenderId(SENDER.to_string()), status)
            .unwrap();
        self.executions.save(&execution).await.unwrap();

        for index in 0..waiting_step {
            let mut done = StepExecution::waiting(
                execution.id.clone(),
                index,
                format!("step_{}", index),
                WaitConfig::default(),
            );
            done.complete(json!("done"));
            self.executions.save_step(&done).await.unwrap();
        }
        let step = StepExecution::waiting(
            execution.id.clone(),
            waiting_step,
            format!("step_{}", waiting_step),
            WaitConfig {
                validator,
                error_message: None,
            },
        );
        self.executions.save_step(&step).await.unwrap();
        execution
    }
}

fn envelope(value: Value) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{ "id": "waba", "changes": [{ "field": "messages", "value": value }] }]
    })
}

fn message_envelope(message: Value) -> Value {
    envelope(json!({
        "messaging_product": "whatsapp",
        "metadata": { "phone_number_id": "1000" },
        "contacts": [{ "profile": { "name": "Ana" }, "wa_id": SENDER }],
        "messages": [message]
    }))
}

pub fn text_payload(id: &str, body: &str) -> Value {
    text_payload_from(id, SENDER, body)
}

pub fn text_payload_from(id: &str, from: &str, body: &str) -> Value {
    message_envelope(json!({
        "from": from, "id": id, "timestamp": "1700000000",
        "type": "text", "text": { "body": body }
    }))
}

pub fn button_payload_from(id: &str, from: &str, button_id: &str) -> Value {
    message_envelope(json!({
        "from": from, "id": id, "timestamp": "1700000000",
        "type": "interactive",
        "interactive": { "type": "button_reply", "button_reply": { "id": button_id, "title": "x" } }
    }))
}

pub fn image_payload(id: &str, media_id: &str, caption: Option<&str>) -> Value {
    let mut image = json!({ "id": media_id, "mime_type": "image/jpeg" });
    if let Some(caption) = caption {
        image["caption"] = json!(caption);
    }
    message_envelope(json!({
        "from": SENDER, "id": id, "timestamp": "1700000000",
        "type": "image", "image": image
    }))
}

pub fn status_payload(statuses: Value) -> Value {
    envelope(json!({ "messaging_product": "whatsapp", "statuses": statuses }))
}
