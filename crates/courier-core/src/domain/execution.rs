use crate::{
    domain::validation::ValidatorKind,
    types::{ExecutionId, SenderId, TenantId, WorkflowId},
    CoreError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Execution is advancing
    Running,

    /// Execution is paused waiting for a user reply
    Waiting,

    /// Execution is paused waiting for a QR-code image
    WaitingForQRCode,

    /// Execution is paused waiting for an external form decision
    WaitingForFormApproval,

    /// Execution has completed successfully
    Completed,

    /// Execution failed
    Failed,
}

impl ExecutionStatus {
    /// True for any of the paused states
    #[inline]
    pub fn is_waiting_state(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Waiting
                | ExecutionStatus::WaitingForQRCode
                | ExecutionStatus::WaitingForFormApproval
        )
    }
}

/// Aggregate: workflow execution header
///
/// `current_step_index` is a cached hint maintained by the engine. It can be
/// stale; the step-execution flagged `is_waiting` is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique identifier
    pub id: ExecutionId,

    /// Workflow definition being executed
    pub workflow_id: WorkflowId,

    /// Owning tenant
    pub tenant_id: TenantId,

    /// Sender that started the execution
    pub initiator: SenderId,

    /// Current status
    pub status: ExecutionStatus,

    /// Whether the execution is paused for input
    pub is_waiting: bool,

    /// Sender whose reply resumes the execution
    pub waiting_for_user: Option<SenderId>,

    /// When the pause began
    pub waiting_since: Option<DateTime<Utc>>,

    /// Cached index of the step believed to be waiting
    pub current_step_index: Option<u32>,

    /// Process variables
    pub variables: HashMap<String, Value>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// Create a running execution bound to its initiator
    pub fn new(workflow_id: WorkflowId, tenant_id: TenantId, initiator: SenderId) -> Self {
        let now = Utc::now();
        Self {
            id: ExecutionId::generate(),
            workflow_id,
            tenant_id,
            initiator,
            status: ExecutionStatus::Running,
            is_waiting: false,
            waiting_for_user: None,
            waiting_since: None,
            current_step_index: None,
            variables: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the timestamp
    #[inline]
    pub fn update_timestamp(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Pause the execution for input from `user`
    pub fn suspend_for_input(
        &mut self,
        step_index: u32,
        user: SenderId,
        status: ExecutionStatus,
    ) -> Result<(), CoreError> {
        if self.status != ExecutionStatus::Running {
            return Err(CoreError::InvalidState(format!(
                "Cannot suspend execution {} in state: {:?}",
                self.id, self.status
            )));
        }
        if !status.is_waiting_state() {
            return Err(CoreError::InvalidState(format!(
                "{:?} is not a waiting status",
                status
            )));
        }

        self.status = status;
        self.is_waiting = true;
        self.waiting_for_user = Some(user);
        self.waiting_since = Some(Utc::now());
        self.current_step_index = Some(step_index);
        self.update_timestamp();
        Ok(())
    }

    /// Clear the execution-level waiting flags and mark it running again
    pub fn clear_waiting(&mut self) -> Result<(), CoreError> {
        if !self.status.is_waiting_state() {
            return Err(CoreError::InvalidState(format!(
                "Cannot resume execution {} in state: {:?}",
                self.id, self.status
            )));
        }

        self.status = ExecutionStatus::Running;
        self.is_waiting = false;
        self.waiting_for_user = None;
        self.waiting_since = None;
        self.update_timestamp();
        Ok(())
    }

    /// Mark the execution failed; it no longer waits for anything
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.is_waiting = false;
        self.waiting_for_user = None;
        self.waiting_since = None;
        self.variables
            .insert("failure_reason".to_string(), Value::String(reason.into()));
        self.update_timestamp();
    }

    /// Set a process variable
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
        self.update_timestamp();
    }
}

/// Step execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Not started
    Pending,
    /// Executing
    Running,
    /// Paused for input
    Waiting,
    /// Finished
    Completed,
    /// Failed
    Failed,
}

/// How a waiting step judges replies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Validator for generic replies
    #[serde(default)]
    pub validator: ValidatorKind,

    /// Prompt sent back on an invalid reply or failed QR decode
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Per-step record of an execution's progress; the authoritative holder of
/// "is this step waiting"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    /// Owning execution
    pub execution_id: ExecutionId,

    /// Zero-based position in the workflow
    pub step_index: u32,

    /// Step name from the definition
    pub step_name: String,

    /// Status
    pub status: StepStatus,

    /// Whether this step is the one paused for input
    pub is_waiting: bool,

    /// Reply handling for the wait
    pub wait: WaitConfig,

    /// Output recorded on completion
    pub output: Option<Value>,

    /// When the step started
    pub started_at: DateTime<Utc>,

    /// When the step completed
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepExecution {
    /// A step paused for input
    pub fn waiting(
        execution_id: ExecutionId,
        step_index: u32,
        step_name: impl Into<String>,
        wait: WaitConfig,
    ) -> Self {
        Self {
            execution_id,
            step_index,
            step_name: step_name.into(),
            status: StepStatus::Waiting,
            is_waiting: true,
            wait,
            output: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Complete the step with its output and drop the waiting flag
    pub fn complete(&mut self, output: Value) {
        self.status = StepStatus::Completed;
        self.is_waiting = false;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
    }
}
