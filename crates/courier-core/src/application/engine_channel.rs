//! Execution-engine adapter that hands start and resume requests to the engine
//! over a bounded channel instead of calling into it.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::domain::collaborators::{ExecutionEngine, ResumeInput};
use crate::domain::execution::Execution;
use crate::domain::workflow::WorkflowDefinition;
use crate::CoreError;

/// A request for the execution engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// Run a freshly created execution
    Start {
        /// Workflow to run
        workflow: WorkflowDefinition,
        /// Execution already saved in the store
        execution: Execution,
    },
    /// Continue a paused execution
    Resume {
        /// Execution with its waiting flags cleared
        execution: Execution,
        /// What resolved the wait
        input: ResumeInput,
    },
}

impl EngineCommand {
    /// Name for logs
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Start { .. } => "start",
            EngineCommand::Resume { .. } => "resume",
        }
    }
}

/// [`ExecutionEngine`] backed by an `mpsc` channel
#[derive(Clone)]
pub struct ChannelExecutionEngine {
    tx: mpsc::Sender<EngineCommand>,
}

impl ChannelExecutionEngine {
    /// Create the adapter and the receiving end for the engine
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    async fn submit(&self, command: EngineCommand) -> Result<(), CoreError> {
        let name = command.name();
        self.tx.send(command).await.map_err(|_| {
            CoreError::ExternalDependency("Execution engine channel is closed".to_string())
        })?;
        trace!(command = name, "submitted engine command");
        Ok(())
    }
}

#[async_trait]
impl ExecutionEngine for ChannelExecutionEngine {
    async fn start(
        &self,
        workflow: &WorkflowDefinition,
        execution: &Execution,
    ) -> Result<(), CoreError> {
        self.submit(EngineCommand::Start {
            workflow: workflow.clone(),
            execution: execution.clone(),
        })
        .await
    }

    async fn resume(&self, execution: &Execution, input: ResumeInput) -> Result<(), CoreError> {
        self.submit(EngineCommand::Resume {
            execution: execution.clone(),
            input,
        })
        .await
    }
}
