//! Main Courier server implementation
//!
//! This module wires the webhook pipeline from configuration and serves it.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use courier_core::domain::repository::memory::{
    MemoryDeliveryRepository, MemoryExecutionStore, MemoryFormRepository,
    MemoryTenantRepository, MemoryValidationRecordRepository, MemoryWorkflowRepository,
};
use courier_core::{
    ChannelExecutionEngine, Collaborators, EngineCommand, InMemoryDeduplicator, QrDecoder,
    ValidatorRegistry, WebhookService,
};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::graph::GraphApiClient;
use crate::qr::{HttpQrDecoder, UnavailableQrDecoder};

/// Main server implementation
pub struct CourierServer {
    /// Configuration
    pub config: ServerConfig,

    /// Inbound callback pipeline
    service: Arc<WebhookService>,
}

impl std::fmt::Debug for CourierServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourierServer")
            .field("bind_address", &self.config.bind_address)
            .field("port", &self.config.port)
            .finish()
    }
}

impl CourierServer {
    /// Create a server around an assembled pipeline
    pub fn new(config: ServerConfig, service: Arc<WebhookService>) -> Self {
        Self { config, service }
    }

    /// Build the in-memory backend and HTTP collaborators described by `config`
    ///
    /// Returns the receiving end of the engine channel; the caller decides who consumes it.
    pub fn from_config(
        config: ServerConfig,
    ) -> ServerResult<(Self, mpsc::Receiver<EngineCommand>)> {
        let graph = Arc::new(GraphApiClient::new(
            config.graph_api_base_url.clone(),
            config.access_token.clone(),
        )?);
        let qr_decoder: Arc<dyn QrDecoder> = match &config.qr_decoder_url {
            Some(url) => Arc::new(HttpQrDecoder::new(url.clone())?),
            None => {
                warn!("No QR decoder configured, QR code steps will always re-prompt");
                Arc::new(UnavailableQrDecoder)
            }
        };
        if config.admin_api_key.is_none() {
            warn!("No admin API key configured, form decisions are accepted from any caller");
        }
        let (engine, engine_rx) = ChannelExecutionEngine::channel(config.engine_queue_capacity);

        info!(
            tenants = config.tenants.len(),
            workflows = config.workflows.len(),
            "seeding in-memory backend"
        );
        let collaborators = Collaborators {
            tenants: Arc::new(MemoryTenantRepository::with_tenants(config.tenants.clone())),
            workflows: Arc::new(MemoryWorkflowRepository::with_workflows(
                config.workflows.clone(),
            )),
            executions: Arc::new(MemoryExecutionStore::new()),
            records: Arc::new(MemoryValidationRecordRepository::new()),
            forms: Arc::new(MemoryFormRepository::new()),
            deliveries: Arc::new(MemoryDeliveryRepository::new()),
            sender: graph.clone(),
            media: graph,
            qr_decoder,
            engine: Arc::new(engine),
            validators: Arc::new(ValidatorRegistry::new()),
            dedup: Arc::new(InMemoryDeduplicator::new(config.dispatch.dedup_ttl())),
        };

        let service = WebhookService::assemble(collaborators, config.dispatch.clone());
        Ok((Self::new(config, Arc::new(service)), engine_rx))
    }

    /// The callback pipeline
    pub fn service(&self) -> &Arc<WebhookService> {
        &self.service
    }

    /// Check an admin bearer token; every token passes when no key is configured
    pub fn validate_admin_token(&self, token: Option<&str>) -> bool {
        match &self.config.admin_api_key {
            Some(key) => token == Some(key.as_str()),
            None => true,
        }
    }

    /// Check the subscription handshake token
    pub fn validate_verify_token(&self, token: Option<&str>) -> bool {
        matches!(
            (&self.config.verify_token, token),
            (Some(expected), Some(token)) if expected == token
        )
    }

    /// Bind and serve until ctrl-c
    pub async fn run(self) -> ServerResult<()> {
        let address = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&address).await?;
        info!(%address, "courier server listening");

        let app = crate::api::build_router(Arc::new(self));
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::InternalError(format!("Server error: {}", e)))
    }
}

/// Log engine commands until the channel closes
///
/// Stands in for the execution engine when the server runs on its own.
pub fn spawn_engine_logger(mut rx: mpsc::Receiver<EngineCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match &command {
                EngineCommand::Start {
                    workflow,
                    execution,
                } => info!(
                    command = command.name(),
                    workflow_id = %workflow.id,
                    execution_id = %execution.id,
                    "engine command"
                ),
                EngineCommand::Resume { execution, input } => info!(
                    command = command.name(),
                    execution_id = %execution.id,
                    input = ?input,
                    "engine command"
                ),
            }
        }
        info!("engine channel closed");
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
