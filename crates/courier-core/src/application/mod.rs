/// Expiring idempotency ledger
pub mod dedup;

/// Raw envelope parsing
pub mod extractor;

/// Built-in reply validators
pub mod validators;

/// Outbound sends with fallback, menu rendering
pub mod messenger;

/// Waiting-state resolution
pub mod resolver;

/// Menu dispatch and message routing
pub mod router;

/// Delivery-status callbacks
pub mod delivery_status;

/// Channel-backed execution engine adapter
pub mod engine_channel;

/// Callback pipeline
pub mod webhook_service;
