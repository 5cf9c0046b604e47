//!
//! Router / dispatcher
//!
//! Decides what an inbound message means, first match wins:
//!
//! 1. the sender has a waiting execution: hand it to the resolver
//! 2. empty text or a menu keyword: send the menu
//! 3. a menu choice, by `option_<n>` identifier, 1-based index or workflow name: start it
//! 4. anything else: resend the menu
//!

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::messenger::Messenger;
use super::resolver::{ResolveOutcome, WaitingStateResolver};
use crate::config::DispatchConfig;
use crate::domain::collaborators::ExecutionEngine;
use crate::domain::execution::Execution;
use crate::domain::message::CanonicalMessage;
use crate::domain::repository::{ExecutionStore, WorkflowRepository};
use crate::domain::workflow::{Tenant, WorkflowDefinition};
use crate::types::{ExecutionId, WorkflowId};
use crate::CoreError;

/// What the router did with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Continued a waiting execution
    Resolved(ResolveOutcome),
    /// Sent the menu
    MenuSent {
        /// Entries offered
        options: usize,
        /// Whether the reply was an unresolvable choice rather than a menu request
        unmatched: bool,
    },
    /// Started a new execution
    Started {
        /// The new execution
        execution_id: ExecutionId,
        /// Its workflow
        workflow_id: WorkflowId,
    },
}

/// Routes canonical messages for one tenant
pub struct Router {
    executions: Arc<dyn ExecutionStore>,
    workflows: Arc<dyn WorkflowRepository>,
    resolver: Arc<WaitingStateResolver>,
    engine: Arc<dyn ExecutionEngine>,
    messenger: Arc<Messenger>,
    config: Arc<DispatchConfig>,
}

impl Router {
    /// Create a router
    pub fn new(
        executions: Arc<dyn ExecutionStore>,
        workflows: Arc<dyn WorkflowRepository>,
        resolver: Arc<WaitingStateResolver>,
        engine: Arc<dyn ExecutionEngine>,
        messenger: Arc<Messenger>,
        config: Arc<DispatchConfig>,
    ) -> Self {
        Self {
            executions,
            workflows,
            resolver,
            engine,
            messenger,
            config,
        }
    }

    /// Route one message
    pub async fn route(
        &self,
        tenant: &Tenant,
        message: &CanonicalMessage,
    ) -> Result<RouteOutcome, CoreError> {
        if let Some(execution) = self
            .executions
            .find_waiting_for_sender(&tenant.id, &message.sender_id)
            .await?
        {
            debug!(
                execution_id = %execution.id,
                status = ?execution.status,
                sender = %message.sender_id,
                "sender has a waiting execution"
            );
            match self
                .resolver
                .resolve_message(tenant, &execution, message)
                .await?
            {
                ResolveOutcome::NoWaitingStep => {
                    debug!(execution_id = %execution.id, "nothing waiting, routing as new conversation");
                }
                outcome => return Ok(RouteOutcome::Resolved(outcome)),
            }
        }

        let workflows = self.workflows.list_menu_workflows(&tenant.id).await?;

        if message.has_empty_text() || self.config.is_menu_keyword(&message.text_body) {
            self.messenger
                .menu(tenant, &message.sender_id, &workflows)
                .await?;
            return Ok(RouteOutcome::MenuSent {
                options: workflows.len(),
                unmatched: false,
            });
        }

        let Some(workflow) = select_workflow(&workflows, message.trimmed_text()) else {
            info!(
                tenant_id = %tenant.id,
                sender = %message.sender_id,
                reply = %message.trimmed_text(),
                "reply matches no menu entry, resending menu"
            );
            self.messenger
                .menu(tenant, &message.sender_id, &workflows)
                .await?;
            return Ok(RouteOutcome::MenuSent {
                options: workflows.len(),
                unmatched: true,
            });
        };

        self.start(tenant, workflow, message).await
    }

    async fn start(
        &self,
        tenant: &Tenant,
        workflow: &WorkflowDefinition,
        message: &CanonicalMessage,
    ) -> Result<RouteOutcome, CoreError> {
        let mut execution = Execution::new(
            workflow.id.clone(),
            tenant.id.clone(),
            message.sender_id.clone(),
        );
        if let Some(name) = &message.contact_name {
            execution.set_variable("contact_name", json!(name));
        }
        self.executions.save(&execution).await?;

        info!(
            execution_id = %execution.id,
            workflow_id = %workflow.id,
            initiator = %execution.initiator,
            "starting workflow from menu"
        );
        if let Err(e) = self.engine.start(workflow, &execution).await {
            execution.fail(e.to_string());
            if let Err(save_err) = self.executions.save(&execution).await {
                warn!(execution_id = %execution.id, error = %save_err, "failed to mark unstarted execution failed");
            }
            return Err(e);
        }

        Ok(RouteOutcome::Started {
            execution_id: execution.id,
            workflow_id: workflow.id.clone(),
        })
    }
}

/// Resolve a reply to a menu entry
///
/// `option_<n>` is unwrapped to `n`. A number selects by 1-based position. Otherwise
/// the first workflow whose name appears in the reply wins.
pub fn select_workflow<'a>(
    workflows: &'a [WorkflowDefinition],
    reply: &str,
) -> Option<&'a WorkflowDefinition> {
    let reply = reply.trim();
    let choice = reply
        .get(..7)
        .filter(|prefix| prefix.eq_ignore_ascii_case("option_"))
        .and_then(|_| reply.get(7..))
        .filter(|suffix| !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(reply);

    if let Ok(position) = choice.parse::<usize>() {
        if let Some(workflow) = position.checked_sub(1).and_then(|i| workflows.get(i)) {
            return Some(workflow);
        }
    }

    let lowered = reply.to_lowercase();
    workflows.iter().find(|wf| {
        let name = wf.name.trim().to_lowercase();
        !name.is_empty() && lowered.contains(&name)
    })
}
