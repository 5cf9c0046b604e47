//! Repository traits for the Courier core
//!
//! Persistence lives outside this crate. The traits below are the narrow
//! views the callback pipeline needs; external crates implement them over a
//! transactional store.

use async_trait::async_trait;

use super::delivery::{BatchAggregate, RecipientDeliveryState};
use super::execution::{Execution, StepExecution};
use super::validation::ValidationRecord;
use super::workflow::{FormInstance, Tenant, WorkflowDefinition};
use crate::types::{
    BatchId, ExecutionId, ExternalMessageId, FormInstanceId, SenderId, TenantId, WorkflowId,
};
use crate::CoreError;

/// Store of execution headers and their step executions
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Find an execution by ID
    async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<Execution>, CoreError>;

    /// Find the execution of `tenant` currently waiting on `sender`, most recent first
    async fn find_waiting_for_sender(
        &self,
        tenant_id: &TenantId,
        sender: &SenderId,
    ) -> Result<Option<Execution>, CoreError>;

    /// Save an execution header
    async fn save(&self, execution: &Execution) -> Result<(), CoreError>;

    /// Find the step execution flagged `is_waiting` for an execution
    async fn find_waiting_step(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<StepExecution>, CoreError>;

    /// Find a step execution by index
    async fn find_step(
        &self,
        execution_id: &ExecutionId,
        step_index: u32,
    ) -> Result<Option<StepExecution>, CoreError>;

    /// Save a step execution
    async fn save_step(&self, step: &StepExecution) -> Result<(), CoreError>;
}

/// Append-only store of validation attempts
#[async_trait]
pub trait ValidationRecordRepository: Send + Sync {
    /// Append a record
    async fn append(&self, record: &ValidationRecord) -> Result<(), CoreError>;

    /// All records of an execution, oldest first
    async fn list_for_execution(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Vec<ValidationRecord>, CoreError>;
}

/// Workflow definitions
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Find a workflow by ID
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<WorkflowDefinition>, CoreError>;

    /// Enabled, webhook-activated workflows of a tenant in menu order
    async fn list_menu_workflows(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<WorkflowDefinition>, CoreError>;
}

/// Tenants
#[async_trait]
pub trait TenantRepository: Send + Sync {
    /// Resolve the opaque routing token from the webhook URL
    async fn find_by_routing_token(&self, token: &str) -> Result<Option<Tenant>, CoreError>;
}

/// Form instances awaiting approval
#[async_trait]
pub trait FormRepository: Send + Sync {
    /// Find a form instance
    async fn find_by_id(&self, id: &FormInstanceId) -> Result<Option<FormInstance>, CoreError>;

    /// Save a form instance
    async fn save(&self, form: &FormInstance) -> Result<(), CoreError>;
}

/// Recipient delivery states and batch aggregates
#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    /// Find the tracked recipient state for a sent message
    async fn find_recipient(
        &self,
        external_message_id: &ExternalMessageId,
        recipient_id: &SenderId,
    ) -> Result<Option<RecipientDeliveryState>, CoreError>;

    /// Save a recipient state
    async fn save_recipient(&self, state: &RecipientDeliveryState) -> Result<(), CoreError>;

    /// Every recipient of a batch
    async fn list_batch_recipients(
        &self,
        batch_id: &BatchId,
    ) -> Result<Vec<RecipientDeliveryState>, CoreError>;

    /// Save a batch aggregate
    async fn save_aggregate(&self, aggregate: &BatchAggregate) -> Result<(), CoreError>;

    /// Find a batch aggregate
    async fn find_aggregate(&self, batch_id: &BatchId)
        -> Result<Option<BatchAggregate>, CoreError>;
}

/// Memory implementations for testing and the standalone server
#[cfg(feature = "testing")]
pub mod memory {
    use super::*;
    use dashmap::DashMap;
    use std::sync::Arc;

    /// In-memory execution store using concurrent maps
    #[derive(Default)]
    pub struct MemoryExecutionStore {
        executions: Arc<DashMap<String, Execution>>,
        steps: Arc<DashMap<(String, u32), StepExecution>>,
    }

    impl MemoryExecutionStore {
        /// Create an empty store
        pub fn new() -> Self {
            Self::default()
        }

        /// All step executions of an execution, ordered by index
        pub fn steps_of(&self, execution_id: &ExecutionId) -> Vec<StepExecution> {
            let mut steps: Vec<StepExecution> = self
                .steps
                .iter()
                .filter(|entry| entry.key().0 == execution_id.0)
                .map(|entry| entry.value().clone())
                .collect();
            steps.sort_by_key(|s| s.step_index);
            steps
        }

        /// Number of stored executions
        pub fn execution_count(&self) -> usize {
            self.executions.len()
        }

        /// Snapshot of every stored execution
        pub fn all_executions(&self) -> Vec<Execution> {
            self.executions.iter().map(|e| e.value().clone()).collect()
        }
    }

    #[async_trait]
    impl ExecutionStore for MemoryExecutionStore {
        async fn find_by_id(&self, id: &ExecutionId) -> Result<Option<Execution>, CoreError> {
            Ok(self.executions.get(&id.0).map(|e| e.clone()))
        }

        async fn find_waiting_for_sender(
            &self,
            tenant_id: &TenantId,
            sender: &SenderId,
        ) -> Result<Option<Execution>, CoreError> {
            let found = self
                .executions
                .iter()
                .filter(|e| {
                    e.is_waiting
                        && e.tenant_id == *tenant_id
                        && e.waiting_for_user.as_ref() == Some(sender)
                })
                .max_by_key(|e| e.waiting_since)
                .map(|e| e.value().clone());
            Ok(found)
        }

        async fn save(&self, execution: &Execution) -> Result<(), CoreError> {
            self.executions
                .insert(execution.id.0.clone(), execution.clone());
            Ok(())
        }

        async fn find_waiting_step(
            &self,
            execution_id: &ExecutionId,
        ) -> Result<Option<StepExecution>, CoreError> {
            Ok(self
                .steps
                .iter()
                .find(|entry| entry.key().0 == execution_id.0 && entry.is_waiting)
                .map(|entry| entry.value().clone()))
        }

        async fn find_step(
            &self,
            execution_id: &ExecutionId,
            step_index: u32,
        ) -> Result<Option<StepExecution>, CoreError> {
            Ok(self
                .steps
                .get(&(execution_id.0.clone(), step_index))
                .map(|s| s.clone()))
        }

        async fn save_step(&self, step: &StepExecution) -> Result<(), CoreError> {
            self.steps
                .insert((step.execution_id.0.clone(), step.step_index), step.clone());
            Ok(())
        }
    }

    /// In-memory append-only validation log
    #[derive(Default)]
    pub struct MemoryValidationRecordRepository {
        records: Arc<DashMap<String, Vec<ValidationRecord>>>,
    }

    impl MemoryValidationRecordRepository {
        /// Create an empty log
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ValidationRecordRepository for MemoryValidationRecordRepository {
        async fn append(&self, record: &ValidationRecord) -> Result<(), CoreError> {
            self.records
                .entry(record.execution_id.0.clone())
                .or_default()
                .push(record.clone());
            Ok(())
        }

        async fn list_for_execution(
            &self,
            execution_id: &ExecutionId,
        ) -> Result<Vec<ValidationRecord>, CoreError> {
            Ok(self
                .records
                .get(&execution_id.0)
                .map(|r| r.clone())
                .unwrap_or_default())
        }
    }

    /// In-memory workflow definitions
    #[derive(Default)]
    pub struct MemoryWorkflowRepository {
        workflows: Arc<DashMap<String, WorkflowDefinition>>,
    }

    impl MemoryWorkflowRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a repository seeded with definitions
        pub fn with_workflows(workflows: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
            let repo = Self::new();
            for wf in workflows {
                repo.insert(wf);
            }
            repo
        }

        /// Insert or replace a definition
        pub fn insert(&self, workflow: WorkflowDefinition) {
            self.workflows.insert(workflow.id.0.clone(), workflow);
        }
    }

    #[async_trait]
    impl WorkflowRepository for MemoryWorkflowRepository {
        async fn find_by_id(
            &self,
            id: &WorkflowId,
        ) -> Result<Option<WorkflowDefinition>, CoreError> {
            Ok(self.workflows.get(&id.0).map(|w| w.clone()))
        }

        async fn list_menu_workflows(
            &self,
            tenant_id: &TenantId,
        ) -> Result<Vec<WorkflowDefinition>, CoreError> {
            let mut result: Vec<WorkflowDefinition> = self
                .workflows
                .iter()
                .filter(|w| w.tenant_id == *tenant_id && w.is_menu_entry())
                .map(|w| w.value().clone())
                .collect();
            result.sort_by(|a, b| {
                a.menu_order
                    .cmp(&b.menu_order)
                    .then_with(|| a.name.cmp(&b.name))
            });
            Ok(result)
        }
    }

    /// In-memory tenants keyed by routing token
    #[derive(Default)]
    pub struct MemoryTenantRepository {
        tenants: Arc<DashMap<String, Tenant>>,
    }

    impl MemoryTenantRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a repository seeded with tenants
        pub fn with_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Self {
            let repo = Self::new();
            for tenant in tenants {
                repo.insert(tenant);
            }
            repo
        }

        /// Insert or replace a tenant
        pub fn insert(&self, tenant: Tenant) {
            self.tenants.insert(tenant.routing_token.clone(), tenant);
        }
    }

    #[async_trait]
    impl TenantRepository for MemoryTenantRepository {
        async fn find_by_routing_token(&self, token: &str) -> Result<Option<Tenant>, CoreError> {
            Ok(self.tenants.get(token).map(|t| t.clone()))
        }
    }

    /// In-memory form instances
    #[derive(Default)]
    pub struct MemoryFormRepository {
        forms: Arc<DashMap<String, FormInstance>>,
    }

    impl MemoryFormRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl FormRepository for MemoryFormRepository {
        async fn find_by_id(&self, id: &FormInstanceId) -> Result<Option<FormInstance>, CoreError> {
            Ok(self.forms.get(&id.0).map(|f| f.clone()))
        }

        async fn save(&self, form: &FormInstance) -> Result<(), CoreError> {
            self.forms.insert(form.id.0.clone(), form.clone());
            Ok(())
        }
    }

    /// In-memory delivery tracking
    #[derive(Default)]
    pub struct MemoryDeliveryRepository {
        recipients: Arc<DashMap<(String, String), RecipientDeliveryState>>,
        aggregates: Arc<DashMap<String, BatchAggregate>>,
    }

    impl MemoryDeliveryRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl DeliveryRepository for MemoryDeliveryRepository {
        async fn find_recipient(
            &self,
            external_message_id: &ExternalMessageId,
            recipient_id: &SenderId,
        ) -> Result<Option<RecipientDeliveryState>, CoreError> {
            Ok(self
                .recipients
                .get(&(external_message_id.0.clone(), recipient_id.0.clone()))
                .map(|r| r.clone()))
        }

        async fn save_recipient(&self, state: &RecipientDeliveryState) -> Result<(), CoreError> {
            self.recipients.insert(
                (
                    state.external_message_id.0.clone(),
                    state.recipient_id.0.clone(),
                ),
                state.clone(),
            );
            Ok(())
        }

        async fn list_batch_recipients(
            &self,
            batch_id: &BatchId,
        ) -> Result<Vec<RecipientDeliveryState>, CoreError> {
            Ok(self
                .recipients
                .iter()
                .filter(|r| r.batch_id == *batch_id)
                .map(|r| r.value().clone())
                .collect())
        }

        async fn save_aggregate(&self, aggregate: &BatchAggregate) -> Result<(), CoreError> {
            self.aggregates
                .insert(aggregate.batch_id.0.clone(), aggregate.clone());
            Ok(())
        }

        async fn find_aggregate(
            &self,
            batch_id: &BatchId,
        ) -> Result<Option<BatchAggregate>, CoreError> {
            Ok(self.aggregates.get(&batch_id.0).map(|a| a.clone()))
        }
    }
}
