//!
//! Waiting-state resolver
//!
//! Continues an execution paused for input. The step-execution flagged
//! `is_waiting` is looked up fresh on every resolution; the execution header's
//! cached step index is never trusted. Resolutions of the same execution are
//! serialised with a per-execution async mutex and the header is re-read under
//! that lock, so two replies racing for one wait cannot both resume it.
//!

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::messenger::Messenger;
use super::validators::ValidatorRegistry;
use crate::config::DispatchConfig;
use crate::domain::collaborators::{ExecutionEngine, MediaFetcher, QrDecoder, ResumeInput};
use crate::domain::execution::{Execution, ExecutionStatus, StepExecution};
use crate::domain::message::CanonicalMessage;
use crate::domain::repository::{ExecutionStore, FormRepository, ValidationRecordRepository};
use crate::domain::validation::{ValidationOutcome, ValidationRecord, QR_CODE_VALIDATOR};
use crate::domain::workflow::{FormDecision, FormInstance, FormStatus, Tenant};
use crate::types::ExecutionId;
use crate::CoreError;

/// How a resolution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The execution was handed back to the engine
    Resumed {
        /// Resumed execution
        execution_id: ExecutionId,
    },
    /// The reply was recorded but rejected; the execution keeps waiting
    Rejected {
        /// Still-waiting execution
        execution_id: ExecutionId,
    },
    /// A QR wait received no usable image; prompted again without recording
    Reprompted {
        /// Still-waiting execution
        execution_id: ExecutionId,
    },
    /// The execution awaits an external form decision; the sender was told so
    ApprovalPending {
        /// Still-waiting execution
        execution_id: ExecutionId,
    },
    /// Nothing is actually waiting; the caller should route the message afresh
    NoWaitingStep,
}

/// Resolves replies and approval decisions for paused executions
pub struct WaitingStateResolver {
    executions: Arc<dyn ExecutionStore>,
    records: Arc<dyn ValidationRecordRepository>,
    forms: Arc<dyn FormRepository>,
    validators: Arc<ValidatorRegistry>,
    media: Arc<dyn MediaFetcher>,
    qr_decoder: Arc<dyn QrDecoder>,
    engine: Arc<dyn ExecutionEngine>,
    messenger: Arc<Messenger>,
    config: Arc<DispatchConfig>,
    locks: DashMap<ExecutionId, Arc<Mutex<()>>>,
}

impl WaitingStateResolver {
    /// Create a resolver
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executions: Arc<dyn ExecutionStore>,
        records: Arc<dyn ValidationRecordRepository>,
        forms: Arc<dyn FormRepository>,
        validators: Arc<ValidatorRegistry>,
        media: Arc<dyn MediaFetcher>,
        qr_decoder: Arc<dyn QrDecoder>,
        engine: Arc<dyn ExecutionEngine>,
        messenger: Arc<Messenger>,
        config: Arc<DispatchConfig>,
    ) -> Self {
        Self {
            executions,
            records,
            forms,
            validators,
            media,
            qr_decoder,
            engine,
            messenger,
            config,
            locks: DashMap::new(),
        }
    }

    /// Resolve an inbound message against the execution found waiting for its sender
    pub async fn resolve_message(
        &self,
        tenant: &Tenant,
        execution: &Execution,
        message: &CanonicalMessage,
    ) -> Result<ResolveOutcome, CoreError> {
        let lock = self.lock_for(&execution.id);
        let result = {
            let _guard = lock.lock().await;
            self.resolve_locked(tenant, &execution.id, message).await
        };
        drop(lock);
        self.release_lock(&execution.id);
        result
    }

    /// Apply an out-of-band approval decision and resume the execution paused on the form
    pub async fn resolve_form_decision(
        &self,
        decision: &FormDecision,
    ) -> Result<ResolveOutcome, CoreError> {
        if decision.status == FormStatus::Pending {
            return Err(CoreError::Validation(
                "A form decision must be approved or rejected".to_string(),
            ));
        }

        let form = self
            .forms
            .find_by_id(&decision.form_instance_id)
            .await?
            .ok_or_else(|| CoreError::FormInstanceNotFound(decision.form_instance_id.to_string()))?;

        let execution_id = form.execution_id.clone();
        let lock = self.lock_for(&execution_id);
        let result = {
            let _guard = lock.lock().await;
            self.apply_form_decision(form, decision).await
        };
        drop(lock);
        self.release_lock(&execution_id);
        result
    }

    fn lock_for(&self, id: &ExecutionId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_lock(&self, id: &ExecutionId) {
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn resolve_locked(
        &self,
        tenant: &Tenant,
        execution_id: &ExecutionId,
        message: &CanonicalMessage,
    ) -> Result<ResolveOutcome, CoreError> {
        let execution = match self.executions.find_by_id(execution_id).await? {
            Some(execution) if execution.is_waiting => execution,
            _ => {
                debug!(execution_id = %execution_id, "execution stopped waiting before resolution");
                return Ok(ResolveOutcome::NoWaitingStep);
            }
        };

        if execution.status == ExecutionStatus::WaitingForFormApproval {
            info!(execution_id = %execution.id, sender = %message.sender_id, "message received while form awaits approval");
            self.notify(tenant, message, &self.config.approval_pending_message)
                .await;
            return Ok(ResolveOutcome::ApprovalPending {
                execution_id: execution.id,
            });
        }

        let step = match self.executions.find_waiting_step(&execution.id).await? {
            Some(step) => step,
            None => {
                warn!(
                    execution_id = %execution.id,
                    hint = ?execution.current_step_index,
                    "execution is waiting but no step execution is flagged"
                );
                return Ok(ResolveOutcome::NoWaitingStep);
            }
        };

        if execution.current_step_index != Some(step.step_index) {
            debug!(
                execution_id = %execution.id,
                hint = ?execution.current_step_index,
                step_index = step.step_index,
                "execution step hint is stale, using flagged step"
            );
        }

        match execution.status {
            ExecutionStatus::WaitingForQRCode => {
                self.resolve_qr_code(tenant, execution, step, message).await
            }
            _ => self.resolve_reply(tenant, execution, step, message).await,
        }
    }

    async fn resolve_qr_code(
        &self,
        tenant: &Tenant,
        mut execution: Execution,
        mut step: StepExecution,
        message: &CanonicalMessage,
    ) -> Result<ResolveOutcome, CoreError> {
        let prompt = step
            .wait
            .error_message
            .clone()
            .unwrap_or_else(|| self.config.qr_error_prompt.clone());

        let Some(media_ref) = message.media_ref.as_ref() else {
            debug!(execution_id = %execution.id, "QR wait received a message without an image");
            self.notify(tenant, message, &prompt).await;
            return Ok(ResolveOutcome::Reprompted {
                execution_id: execution.id,
            });
        };

        let media = match self.media.fetch(tenant, &media_ref.media_id).await {
            Ok(media) => media,
            Err(e) => {
                warn!(execution_id = %execution.id, media_id = %media_ref.media_id, error = %e, "media fetch failed");
                self.notify(tenant, message, &prompt).await;
                return Ok(ResolveOutcome::Reprompted {
                    execution_id: execution.id,
                });
            }
        };

        let caption = message.text_body.clone();
        let decoded = match self.qr_decoder.decode(&media.bytes).await {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                warn!(execution_id = %execution.id, error = %e, "QR decode failed");
                None
            }
        };

        let outcome = match &decoded {
            Some(value) => ValidationOutcome::valid(json!({
                "qr_value": value,
                "caption": caption,
                "mime_type": media.mime_type,
            })),
            None => ValidationOutcome {
                is_valid: false,
                error_message: Some(prompt.clone()),
                processed_data: Some(json!({ "caption": caption })),
            },
        };
        let record = ValidationRecord::from_outcome(
            execution.id.clone(),
            step.step_index,
            &caption,
            Some(media_ref.media_id.clone()),
            QR_CODE_VALIDATOR,
            &outcome,
        );
        self.records.append(&record).await?;

        let Some(value) = decoded else {
            info!(execution_id = %execution.id, step_index = step.step_index, "no QR code in image");
            self.notify(tenant, message, &prompt).await;
            return Ok(ResolveOutcome::Rejected {
                execution_id: execution.id,
            });
        };

        let (execution_before, step_before) = (execution.clone(), step.clone());
        step.complete(json!({ "qr_value": value }));
        execution.clear_waiting()?;
        self.executions.save_step(&step).await?;
        self.executions.save(&execution).await?;

        info!(execution_id = %execution.id, step_index = step.step_index, "QR code accepted, resuming");
        let resumed = self
            .engine
            .resume(
                &execution,
                ResumeInput::QrCode {
                    message: message.clone(),
                    value,
                },
            )
            .await;
        if let Err(e) = resumed {
            self.restore(&execution_before, Some(&step_before)).await;
            return Err(e);
        }

        Ok(ResolveOutcome::Resumed {
            execution_id: execution.id,
        })
    }

    async fn resolve_reply(
        &self,
        tenant: &Tenant,
        mut execution: Execution,
        step: StepExecution,
        message: &CanonicalMessage,
    ) -> Result<ResolveOutcome, CoreError> {
        let validator = self.validators.resolve(&step.wait.validator)?;
        let outcome = validator
            .validate(&message.text_body, &execution, step.step_index)
            .await?;

        let record = ValidationRecord::from_outcome(
            execution.id.clone(),
            step.step_index,
            &message.text_body,
            message.media_ref.as_ref().map(|m| m.media_id.clone()),
            validator.kind(),
            &outcome,
        );
        self.records.append(&record).await?;

        if !outcome.is_valid {
            let reply = outcome
                .error_message
                .as_deref()
                .or(step.wait.error_message.as_deref())
                .unwrap_or(&self.config.default_validation_error);
            info!(
                execution_id = %execution.id,
                step_index = step.step_index,
                validator = validator.kind(),
                "reply rejected"
            );
            self.notify(tenant, message, reply).await;
            return Ok(ResolveOutcome::Rejected {
                execution_id: execution.id,
            });
        }

        // The step keeps its waiting flag; the engine transitions it on resume.
        let execution_before = execution.clone();
        execution.clear_waiting()?;
        self.executions.save(&execution).await?;

        info!(execution_id = %execution.id, step_index = step.step_index, "reply accepted, resuming");
        let resumed = self
            .engine
            .resume(
                &execution,
                ResumeInput::Reply {
                    message: message.clone(),
                    processed_data: outcome.processed_data,
                },
            )
            .await;
        if let Err(e) = resumed {
            self.restore(&execution_before, None).await;
            return Err(e);
        }

        Ok(ResolveOutcome::Resumed {
            execution_id: execution.id,
        })
    }

    async fn apply_form_decision(
        &self,
        mut form: FormInstance,
        decision: &FormDecision,
    ) -> Result<ResolveOutcome, CoreError> {
        let mut execution = self
            .executions
            .find_by_id(&form.execution_id)
            .await?
            .ok_or_else(|| CoreError::ExecutionNotFound(form.execution_id.to_string()))?;

        if execution.status != ExecutionStatus::WaitingForFormApproval {
            return Err(CoreError::InvalidState(format!(
                "Execution {} is not waiting for form approval: {:?}",
                execution.id, execution.status
            )));
        }

        let (execution_before, form_before) = (execution.clone(), form.clone());
        form.status = decision.status;
        form.decided_by = decision.decided_by.clone();
        form.comment = decision.comment.clone();
        form.decided_at = Some(Utc::now());
        self.forms.save(&form).await?;

        let variable = form
            .decision_variable
            .clone()
            .unwrap_or_else(|| self.config.form_decision_variable.clone());
        execution.set_variable(variable, json!(decision.status.as_str()));
        execution.clear_waiting()?;
        self.executions.save(&execution).await?;

        info!(
            execution_id = %execution.id,
            form_instance_id = %form.id,
            status = decision.status.as_str(),
            "form decided, resuming"
        );
        let resumed = self
            .engine
            .resume(
                &execution,
                ResumeInput::FormDecision {
                    form_instance_id: form.id.clone(),
                    status: decision.status,
                },
            )
            .await;
        if let Err(e) = resumed {
            if let Err(restore_err) = self.forms.save(&form_before).await {
                warn!(form_instance_id = %form.id, error = %restore_err, "failed to restore form after resume failure");
            }
            self.restore(&execution_before, None).await;
            return Err(e);
        }

        Ok(ResolveOutcome::Resumed {
            execution_id: execution.id,
        })
    }

    /// Put back the waiting state a failed resume cleared, so a retry finds the wait again
    async fn restore(&self, execution: &Execution, step: Option<&StepExecution>) {
        if let Some(step) = step {
            if let Err(e) = self.executions.save_step(step).await {
                warn!(execution_id = %execution.id, step_index = step.step_index, error = %e, "failed to restore step after resume failure");
            }
        }
        match self.executions.save(execution).await {
            Ok(()) => info!(execution_id = %execution.id, status = ?execution.status, "resume failed, execution left waiting"),
            Err(e) => warn!(execution_id = %execution.id, error = %e, "failed to restore execution after resume failure"),
        }
    }

    /// Prompts are best effort; a failed send leaves the recorded state as is
    async fn notify(&self, tenant: &Tenant, message: &CanonicalMessage, body: &str) {
        if let Err(e) = self.messenger.text(tenant, &message.sender_id, body).await {
            warn!(recipient = %message.sender_id, error = %e, "failed to send prompt");
        }
    }
}
