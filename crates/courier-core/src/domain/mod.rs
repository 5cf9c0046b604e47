/// Canonical inbound events
pub mod message;

/// Execution and step-execution models
pub mod execution;

/// Validation configuration and records
pub mod validation;

/// Delivery-status state machine and batch aggregation
pub mod delivery;

/// Tenants, workflow definitions and forms
pub mod workflow;

/// Repository interfaces
pub mod repository;

/// External collaborator interfaces
pub mod collaborators;
