//! # Backend contracts
//!
//! The traits in this module describe what a storage backend must provide for the fulfillment engine to work. The
//! public API types in [`crate::ffe_api`] are generic over these traits, so any backend that implements them (the
//! bundled one being [`crate::SqliteDatabase`]) can drive the engine.
//!
//! * [`InventoryManagement`] covers the catalog read model, bindings, the physical reservation ledger and the
//!   virtual stock pools.
//! * [`OrderManagement`] owns the order aggregate. Every state transition that touches stock runs in a single backend
//!   transaction, so partial failures roll back cleanly.
//! * [`PollingTaskStore`] durably mirrors the payment polling queue.
//! * [`PaymentVerifier`] is not a storage contract. It is the narrow interface to whatever confirms payments.
//!
//! Backends must serialize stock mutations per pool. Two reservations against the same pool may never both pass a
//! stock check against a stale count.
mod data_objects;
mod inventory_management;
mod order_management;
mod payment_verifier;
mod polling_task_store;

pub use data_objects::{
    AdjustOutcome,
    AdjustRequest,
    BindingCandidate,
    LedgerOutcome,
    PaidTransition,
    PaymentRecord,
    PoolQueryFilter,
    SweepResult,
};
pub use inventory_management::{AllocationError, InventoryError, InventoryManagement};
pub use order_management::{OrderFlowError, OrderManagement};
pub use payment_verifier::{PaymentCheckResult, PaymentVerifier, RefundResult, VerifierError};
pub use polling_task_store::{PollingError, PollingTaskStore};
