use thiserror::Error;

use crate::{
    db_types::PollingTask,
    traits::{OrderFlowError, VerifierError},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollingError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Could not decode the stored polling task for order {0}. {1}")]
    CorruptTask(i64, String),
    #[error("{0}")]
    OrderFlow(#[from] OrderFlowError),
    #[error("{0}")]
    Verifier(#[from] VerifierError),
}

impl From<sqlx::Error> for PollingError {
    fn from(e: sqlx::Error) -> Self {
        PollingError::DatabaseError(e.to_string())
    }
}

/// Durable mirror of the payment polling queue, keyed by order id.
#[allow(async_fn_in_trait)]
pub trait PollingTaskStore: Clone {
    /// Inserts or replaces the task record for the task's order.
    async fn save_polling_task(&self, task: &PollingTask) -> Result<(), PollingError>;

    async fn delete_polling_task(&self, order_id: i64) -> Result<(), PollingError>;

    /// Loads every stored task. Records that cannot be decoded are dropped from storage and skipped.
    async fn fetch_polling_tasks(&self) -> Result<Vec<PollingTask>, PollingError>;
}
