//! Outbound sends with the plain-text fallback, and menu rendering.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::domain::collaborators::{ButtonOption, ListRow, MessageSender, SentMessage};
use crate::domain::workflow::{Tenant, WorkflowDefinition};
use crate::types::SenderId;
use crate::CoreError;

const BUTTON_TITLE_MAX: usize = 20;
const ROW_TITLE_MAX: usize = 24;
const ROW_DESCRIPTION_MAX: usize = 72;

/// Identifier of the menu entry at 1-based `position`
pub fn option_id(position: usize) -> String {
    format!("option_{}", position)
}

/// Wraps a [`MessageSender`]. Interactive sends that fail are retried once as
/// plain text listing the options and the configured hint.
pub struct Messenger {
    sender: Arc<dyn MessageSender>,
    config: Arc<DispatchConfig>,
}

impl Messenger {
    /// Create a messenger
    pub fn new(sender: Arc<dyn MessageSender>, config: Arc<DispatchConfig>) -> Self {
        Self { sender, config }
    }

    /// Send plain text
    pub async fn text(
        &self,
        tenant: &Tenant,
        to: &SenderId,
        body: &str,
    ) -> Result<SentMessage, CoreError> {
        self.sender.send_text(tenant, to, body).await
    }

    /// Send reply buttons, falling back to text
    pub async fn buttons(
        &self,
        tenant: &Tenant,
        to: &SenderId,
        body: &str,
        buttons: &[ButtonOption],
    ) -> Result<SentMessage, CoreError> {
        match self.sender.send_buttons(tenant, to, body, buttons).await {
            Ok(sent) => Ok(sent),
            Err(e) => {
                warn!(recipient = %to, error = %e, "button send failed, falling back to text");
                let titles: Vec<&str> = buttons.iter().map(|b| b.title.as_str()).collect();
                self.sender
                    .send_text(tenant, to, &self.fallback_text(body, &titles))
                    .await
            }
        }
    }

    /// Send a list picker, falling back to text
    pub async fn list(
        &self,
        tenant: &Tenant,
        to: &SenderId,
        body: &str,
        button_label: &str,
        rows: &[ListRow],
    ) -> Result<SentMessage, CoreError> {
        match self
            .sender
            .send_list(tenant, to, body, button_label, rows)
            .await
        {
            Ok(sent) => Ok(sent),
            Err(e) => {
                warn!(recipient = %to, error = %e, "list send failed, falling back to text");
                let titles: Vec<&str> = rows.iter().map(|r| r.title.as_str()).collect();
                self.sender
                    .send_text(tenant, to, &self.fallback_text(body, &titles))
                    .await
            }
        }
    }

    /// Send the menu of entry-point workflows
    pub async fn menu(
        &self,
        tenant: &Tenant,
        to: &SenderId,
        workflows: &[WorkflowDefinition],
    ) -> Result<SentMessage, CoreError> {
        if workflows.is_empty() {
            debug!(tenant_id = %tenant.id, "no menu workflows, sending empty-menu notice");
            return self
                .text(tenant, to, &self.config.empty_menu_message)
                .await;
        }

        let header = &self.config.menu_header;
        if workflows.len() <= self.config.max_button_options {
            let buttons: Vec<ButtonOption> = workflows
                .iter()
                .enumerate()
                .map(|(i, wf)| ButtonOption {
                    id: option_id(i + 1),
                    title: truncate(&wf.name, BUTTON_TITLE_MAX),
                })
                .collect();
            self.buttons(tenant, to, header, &buttons).await
        } else {
            let rows: Vec<ListRow> = workflows
                .iter()
                .enumerate()
                .map(|(i, wf)| ListRow {
                    id: option_id(i + 1),
                    title: truncate(&wf.name, ROW_TITLE_MAX),
                    description: wf
                        .description
                        .as_deref()
                        .map(|d| truncate(d, ROW_DESCRIPTION_MAX)),
                })
                .collect();
            self.list(tenant, to, header, &self.config.menu_button_label, &rows)
                .await
        }
    }

    fn fallback_text(&self, body: &str, titles: &[&str]) -> String {
        let mut text = body.to_string();
        if !titles.is_empty() {
            text.push_str("\n\n");
            let numbered: Vec<String> = titles
                .iter()
                .enumerate()
                .map(|(i, title)| format!("{}. {}", i + 1, title))
                .collect();
            text.push_str(&numbered.join("\n"));
        }
        text.push_str("\n\n");
        text.push_str(&self.config.menu_fallback_hint);
        text
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
