//! Graph API client
//!
//! Outbound messages and media downloads against the provider's HTTP API.
//! Requests use the tenant's access token, or the configured default when the
//! tenant has none.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use courier_core::{
    ButtonOption, CoreError, ExternalMessageId, FetchedMedia, ListRow, MediaFetcher,
    MessageSender, SenderId, SentMessage, Tenant,
};

use crate::error::{ServerError, ServerResult};

/// Title of the single section in list messages
const LIST_SECTION_TITLE: &str = "Options";

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentId>,
}

#[derive(Debug, Deserialize)]
struct SentId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    url: String,
    #[serde(default)]
    mime_type: Option<String>,
}

/// [`MessageSender`] and [`MediaFetcher`] over the Graph API
#[derive(Debug, Clone)]
pub struct GraphApiClient {
    /// Base URL, e.g. `https://graph.facebook.com/v19.0`
    base_url: String,

    /// Fallback access token
    default_token: Option<String>,

    /// HTTP client
    client: Client,
}

impl GraphApiClient {
    /// Create a client for `base_url`
    pub fn new(base_url: impl Into<String>, default_token: Option<String>) -> ServerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ServerError::ConfigurationError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_token,
            client,
        })
    }

    fn token<'a>(&'a self, tenant: &'a Tenant) -> Result<&'a str, CoreError> {
        tenant
            .access_token
            .as_deref()
            .or(self.default_token.as_deref())
            .ok_or_else(|| {
                CoreError::Configuration(format!("No access token for tenant {}", tenant.id))
            })
    }

    fn messages_url(&self, tenant: &Tenant) -> String {
        format!("{}/{}/messages", self.base_url, tenant.phone_number_id)
    }

    async fn post_message(
        &self,
        tenant: &Tenant,
        to: &SenderId,
        kind: &str,
        content: Value,
    ) -> Result<SentMessage, CoreError> {
        let mut body = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to.as_str(),
            "type": kind,
        });
        body[kind] = content;

        let response = self
            .client
            .post(self.messages_url(tenant))
            .bearer_auth(self.token(tenant)?)
            .json(&body)
            .send()
            .await
            .map_err(upstream)?;
        let response = ensure_success(response, "send message").await?;

        let sent: SendResponse = response.json().await.map_err(upstream)?;
        let external_id = sent
            .messages
            .into_iter()
            .next()
            .map(|m| ExternalMessageId(m.id));
        debug!(to = %to, kind, external_id = ?external_id, "message sent");
        Ok(SentMessage { external_id })
    }
}

#[async_trait]
impl MessageSender for GraphApiClient {
    async fn send_text(
        &self,
        tenant: &Tenant,
        to: &SenderId,
        body: &str,
    ) -> Result<SentMessage, CoreError> {
        self.post_message(tenant, to, "text", json!({ "body": body }))
            .await
    }

    async fn send_buttons(
        &self,
        tenant: &Tenant,
        to: &SenderId,
        body: &str,
        buttons: &[ButtonOption],
    ) -> Result<SentMessage, CoreError> {
        let buttons: Vec<Value> = buttons
            .iter()
            .map(|b| json!({ "type": "reply", "reply": { "id": b.id, "title": b.title } }))
            .collect();

        self.post_message(
            tenant,
            to,
            "interactive",
            json!({
                "type": "button",
                "body": { "text": body },
                "action": { "buttons": buttons },
            }),
        )
        .await
    }

    async fn send_list(
        &self,
        tenant: &Tenant,
        to: &SenderId,
        body: &str,
        button_label: &str,
        rows: &[ListRow],
    ) -> Result<SentMessage, CoreError> {
        let rows: Vec<Value> = rows
            .iter()
            .map(|row| {
                let mut value = json!({ "id": row.id, "title": row.title });
                if let Some(description) = &row.description {
                    value["description"] = json!(description);
                }
                value
            })
            .collect();

        self.post_message(
            tenant,
            to,
            "interactive",
            json!({
                "type": "list",
                "body": { "text": body },
                "action": {
                    "button": button_label,
                    "sections": [{ "title": LIST_SECTION_TITLE, "rows": rows }],
                },
            }),
        )
        .await
    }
}

#[async_trait]
impl MediaFetcher for GraphApiClient {
    async fn fetch(&self, tenant: &Tenant, media_id: &str) -> Result<FetchedMedia, CoreError> {
        let token = self.token(tenant)?;

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, media_id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(upstream)?;
        let info: MediaInfo = ensure_success(response, "media lookup")
            .await?
            .json()
            .await
            .map_err(upstream)?;

        let response = self
            .client
            .get(&info.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(upstream)?;
        let response = ensure_success(response, "media download").await?;

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(upstream)?;

        debug!(media_id, size = bytes.len(), "media downloaded");
        Ok(FetchedMedia {
            bytes: bytes.to_vec(),
            mime_type: info
                .mime_type
                .or(header_type)
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        })
    }
}

fn upstream(err: reqwest::Error) -> CoreError {
    CoreError::ExternalDependency(format!("Graph API request failed: {}", err))
}

async fn ensure_success(response: Response, action: &str) -> Result<Response, CoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CoreError::ExternalDependency(format!(
        "Graph API {} failed with {}: {}",
        action, status, body
    )))
}
