//! Configuration for the Courier server
//!
//! Defaults, then an optional YAML file named by `COURIER_CONFIG`, then
//! environment overrides.

use courier_core::{DispatchConfig, Tenant, WorkflowDefinition};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

use crate::error::{ServerError, ServerResult};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format
    #[serde(default)]
    pub log_format: LogFormat,

    /// App secret; enables `X-Hub-Signature-256` verification when set
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Token expected in the subscription handshake
    #[serde(default)]
    pub verify_token: Option<String>,

    /// Bearer token for the form-decision route
    #[serde(default)]
    pub admin_api_key: Option<String>,

    /// Base URL of the provider Graph API
    #[serde(default = "default_graph_api_base_url")]
    pub graph_api_base_url: String,

    /// Access token used when a tenant has none of its own
    #[serde(default)]
    pub access_token: Option<String>,

    /// QR decode service; decoding is unavailable without one
    #[serde(default)]
    pub qr_decoder_url: Option<String>,

    /// Capacity of the engine command channel
    #[serde(default = "default_engine_queue_capacity")]
    pub engine_queue_capacity: usize,

    /// Dispatch behaviour and user-facing texts
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Tenants seeded into the in-memory backend
    #[serde(default)]
    pub tenants: Vec<Tenant>,

    /// Workflows seeded into the in-memory backend
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_graph_api_base_url() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

fn default_engine_queue_capacity() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            app_secret: None,
            verify_token: None,
            admin_api_key: None,
            graph_api_base_url: default_graph_api_base_url(),
            access_token: None,
            qr_decoder_url: None,
            engine_queue_capacity: default_engine_queue_capacity(),
            dispatch: DispatchConfig::default(),
            tenants: Vec::new(),
            workflows: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from an optional config file and environment variables
    pub fn load() -> ServerResult<Self> {
        let mut config = match env::var("COURIER_CONFIG") {
            Ok(path) => {
                info!(%path, "loading configuration file");
                Self::from_yaml(&std::fs::read_to_string(&path)?)?
            }
            Err(_) => Self::default(),
        };

        config.apply_env(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document; absent fields take their defaults
    pub fn from_yaml(source: &str) -> ServerResult<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Apply overrides from `lookup`, usually the process environment
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.port = port;
            } else {
                warn!("Invalid SERVER_PORT value: {}", port);
            }
        }

        if let Some(host) = lookup("SERVER_HOST") {
            self.bind_address = host;
        }

        if let Some(log_level) = lookup("LOG_LEVEL") {
            self.log_level = log_level;
        }

        if let Some(log_format) = lookup("LOG_FORMAT") {
            match LogFormat::parse(&log_format) {
                Some(format) => self.log_format = format,
                None => warn!("Invalid LOG_FORMAT value: {}", log_format),
            }
        }

        if let Some(secret) = lookup("WHATSAPP_APP_SECRET") {
            self.app_secret = Some(secret);
        }

        if let Some(token) = lookup("WHATSAPP_VERIFY_TOKEN") {
            self.verify_token = Some(token);
        }

        if let Some(key) = lookup("ADMIN_API_KEY") {
            self.admin_api_key = Some(key);
        }

        if let Some(url) = lookup("GRAPH_API_BASE_URL") {
            self.graph_api_base_url = url;
        }

        if let Some(token) = lookup("WHATSAPP_ACCESS_TOKEN") {
            self.access_token = Some(token);
        }

        if let Some(url) = lookup("QR_DECODER_URL") {
            self.qr_decoder_url = Some(url);
        }

        if let Some(ttl) = lookup("DEDUP_TTL_SECS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.dispatch.dedup_ttl_secs = ttl;
            } else {
                warn!("Invalid DEDUP_TTL_SECS value: {}", ttl);
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ServerResult<()> {
        if self.graph_api_base_url.trim().is_empty() {
            return Err(ServerError::ConfigurationError(
                "graph_api_base_url must not be empty".to_string(),
            ));
        }

        if self.engine_queue_capacity == 0 {
            return Err(ServerError::ConfigurationError(
                "engine_queue_capacity must be positive".to_string(),
            ));
        }

        self.dispatch.validate()?;

        if self.app_secret.is_none() {
            warn!("No app secret configured, webhook signatures will not be verified");
        }

        Ok(())
    }
}
