//! Dispatch configuration
//!
//! Prompts, menu keywords and ledger retention used by the callback pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::CoreError;

/// Configuration for routing, prompts and deduplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Words that (re)open the menu, compared case-insensitively
    #[serde(default = "default_menu_keywords")]
    pub menu_keywords: Vec<String>,

    /// Text above the menu options
    #[serde(default = "default_menu_header")]
    pub menu_header: String,

    /// Label of the list-picker button
    #[serde(default = "default_menu_button_label")]
    pub menu_button_label: String,

    /// Appended when a list or button send falls back to plain text
    #[serde(default = "default_menu_fallback_hint")]
    pub menu_fallback_hint: String,

    /// Sent when the tenant has no menu workflows
    #[serde(default = "default_empty_menu_message")]
    pub empty_menu_message: String,

    /// Sent when a validator rejects a reply without a suggestion
    #[serde(default = "default_validation_error")]
    pub default_validation_error: String,

    /// Sent when a QR image is missing, unreadable or undecodable
    #[serde(default = "default_qr_error_prompt")]
    pub qr_error_prompt: String,

    /// Sent when a message arrives while a form awaits approval
    #[serde(default = "default_approval_pending_message")]
    pub approval_pending_message: String,

    /// Sent when a downstream service fails while handling a message
    #[serde(default = "default_apology_message")]
    pub apology_message: String,

    /// Process variable receiving form decisions
    #[serde(default = "default_form_decision_variable")]
    pub form_decision_variable: String,

    /// Retention of the dedup ledger in seconds
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,

    /// Menus with at most this many entries are sent as buttons, larger ones as a list
    #[serde(default = "default_max_button_options")]
    pub max_button_options: usize,
}

// Default values
fn default_menu_keywords() -> Vec<String> {
    ["menu", "menú", "inicio", "start", "hola", "hi", "oi"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_menu_header() -> String {
    "How can we help you? Choose an option:".to_string()
}
fn default_menu_button_label() -> String {
    "Options".to_string()
}
fn default_menu_fallback_hint() -> String {
    "Reply with the number of the option you want.".to_string()
}
fn default_empty_menu_message() -> String {
    "There are no services available right now.".to_string()
}
fn default_validation_error() -> String {
    "Sorry, that answer is not valid. Please try again.".to_string()
}
fn default_qr_error_prompt() -> String {
    "We could not read a QR code. Please send a clear photo of the QR code.".to_string()
}
fn default_approval_pending_message() -> String {
    "Your request is awaiting approval. We will get back to you soon.".to_string()
}
fn default_apology_message() -> String {
    "Sorry, something went wrong on our side. Please try again in a moment.".to_string()
}
fn default_form_decision_variable() -> String {
    "approval_status".to_string()
}
fn default_dedup_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_max_button_options() -> usize {
    3
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            menu_keywords: default_menu_keywords(),
            menu_header: default_menu_header(),
            menu_button_label: default_menu_button_label(),
            menu_fallback_hint: default_menu_fallback_hint(),
            empty_menu_message: default_empty_menu_message(),
            default_validation_error: default_validation_error(),
            qr_error_prompt: default_qr_error_prompt(),
            approval_pending_message: default_approval_pending_message(),
            apology_message: default_apology_message(),
            form_decision_variable: default_form_decision_variable(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            max_button_options: default_max_button_options(),
        }
    }
}

impl DispatchConfig {
    /// Ledger retention as a duration
    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_secs(self.dedup_ttl_secs)
    }

    /// Whether `text` is one of the menu keywords
    pub fn is_menu_keyword(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        self.menu_keywords
            .iter()
            .any(|keyword| keyword.trim().to_lowercase() == text)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.dedup_ttl_secs == 0 {
            return Err(CoreError::Configuration(
                "dedup_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_button_options > 3 {
            return Err(CoreError::Configuration(
                "max_button_options cannot exceed 3 reply buttons".to_string(),
            ));
        }
        Ok(())
    }
}
