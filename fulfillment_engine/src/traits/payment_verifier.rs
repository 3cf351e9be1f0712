use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Order, PaymentMethod};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifierError {
    #[error("The payment check timed out")]
    Timeout,
    #[error("Could not reach the payment provider. {0}")]
    Transport(String),
    #[error("The payment provider returned an unexpected response. {0}")]
    InvalidResponse(String),
    #[error("Payment method {0} is not configured for this operation")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCheckResult {
    pub paid: bool,
    pub transaction_id: Option<String>,
    pub message: Option<String>,
    /// Opaque provider data, stored alongside the payment record.
    pub data: Option<String>,
}

impl PaymentCheckResult {
    pub fn not_paid() -> Self {
        Self::default()
    }

    pub fn paid(transaction_id: &str) -> Self {
        Self { paid: true, transaction_id: Some(transaction_id.to_string()), ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResult {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<String>,
}

/// The narrow interface to whatever confirms payments with the outside world.
///
/// Implementations are treated as untrusted and potentially slow. Callers bound every call with a timeout, and errors
/// from [`Self::check_status`] only ever mean "not paid yet".
#[allow(async_fn_in_trait)]
pub trait PaymentVerifier {
    async fn check_status(&self, order: &Order, method: &PaymentMethod) -> Result<PaymentCheckResult, VerifierError>;

    async fn refund(&self, order: &Order, method: &PaymentMethod) -> Result<RefundResult, VerifierError>;
}
