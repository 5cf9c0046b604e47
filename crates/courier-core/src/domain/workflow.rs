use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ExecutionId, FormInstanceId, TenantId, WorkflowId};

/// Tenant resolved from the webhook routing token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant ID
    pub id: TenantId,

    /// Opaque token carried in the webhook URL
    pub routing_token: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Provider phone number ID used for outbound sends
    #[serde(default)]
    pub phone_number_id: String,

    /// Tenant-specific provider access token
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Workflow definition as seen by the menu
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow ID
    pub id: WorkflowId,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Display name shown in the menu
    pub name: String,

    /// Short description shown in list menus
    #[serde(default)]
    pub description: Option<String>,

    /// Whether the workflow can run at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether the workflow can be started from an inbound message
    #[serde(default = "default_true")]
    pub webhook_activated: bool,

    /// Position in the menu, lower first
    #[serde(default)]
    pub menu_order: i32,
}

fn default_true() -> bool {
    true
}

impl WorkflowDefinition {
    /// Shown in the inbound menu
    #[inline]
    pub fn is_menu_entry(&self) -> bool {
        self.enabled && self.webhook_activated
    }
}

/// Form instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormStatus {
    /// Submitted, awaiting a decision
    Pending,
    /// Approved by a reviewer
    Approved,
    /// Rejected by a reviewer
    Rejected,
}

impl FormStatus {
    /// Lower-case name stamped onto the process variable
    pub fn as_str(&self) -> &'static str {
        match self {
            FormStatus::Pending => "pending",
            FormStatus::Approved => "approved",
            FormStatus::Rejected => "rejected",
        }
    }
}

/// A form submitted from a workflow and awaiting approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormInstance {
    /// Form instance ID
    pub id: FormInstanceId,

    /// Execution paused on this form
    pub execution_id: ExecutionId,

    /// Current status
    pub status: FormStatus,

    /// Process variable receiving the decision; the configured default applies when absent
    #[serde(default)]
    pub decision_variable: Option<String>,

    /// Who decided
    #[serde(default)]
    pub decided_by: Option<String>,

    /// Reviewer comment
    #[serde(default)]
    pub comment: Option<String>,

    /// When the decision was made
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

/// An out-of-band approval decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormDecision {
    /// Form being decided
    pub form_instance_id: FormInstanceId,

    /// New status, approved or rejected
    pub status: FormStatus,

    /// Reviewer
    #[serde(default)]
    pub decided_by: Option<String>,

    /// Reviewer comment
    #[serde(default)]
    pub comment: Option<String>,
}
