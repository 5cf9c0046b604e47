//!
//! Courier Server - HTTP boundary for inbound messaging callbacks
//!
//! Verifies and acknowledges provider webhooks, hands them to the
//! `courier-core` pipeline, and talks back to the provider over its Graph API.
//!

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Graph API client module
pub mod graph;

/// QR decoding module
pub mod qr;

/// Server module
pub mod server;

/// Webhook signature module
pub mod signature;

// Re-export key types
pub use config::{LogFormat, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::CourierServer;

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    // Initialize logging
    init_logging(&config);

    config.validate()?;

    let (server, engine_rx) = CourierServer::from_config(config)?;
    server::spawn_engine_logger(engine_rx);

    server.run().await
}

/// Initialize logging
fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = fmt().with_env_filter(filter).with_target(true);
    let initialized = match config.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    if initialized.is_err() {
        tracing::debug!("global subscriber already set");
    }
}
