//! A [`PaymentVerifier`] that asks the payment provider over HTTP.
//!
//! Each payment method carries its own `check_url` and `refund_url`. The verifier POSTs a [`PaymentQuery`] to the
//! relevant URL and expects a JSON [`PaymentCheckResult`] or [`RefundResult`] in return. Any non-2xx response is
//! treated as an invalid response, and network failures as transport errors.
use std::time::Duration;

use fulfillment_engine::{
    db_types::{Order, PaymentMethod},
    traits::{PaymentCheckResult, PaymentVerifier, RefundResult, VerifierError},
};
use log::*;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// The body sent to a payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentQuery {
    pub order_no: String,
    pub customer_id: String,
    pub payment_method: String,
}

impl PaymentQuery {
    pub fn new(order: &Order, method: &PaymentMethod) -> Self {
        Self {
            order_no: order.order_no.as_str().to_string(),
            customer_id: order.customer_id.clone(),
            payment_method: method.name.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpPaymentVerifier {
    client: Client,
}

impl HttpPaymentVerifier {
    /// `timeout` bounds every request, independently of the check timeout the engine applies.
    pub fn new(timeout: Duration) -> Result<Self, VerifierError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| VerifierError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    async fn post<T: DeserializeOwned>(&self, url: &str, query: &PaymentQuery) -> Result<T, VerifierError> {
        let response = self.client.post(url).json(query).send().await.map_err(|e| {
            if e.is_timeout() {
                VerifierError::Timeout
            } else {
                VerifierError::Transport(e.to_string())
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifierError::InvalidResponse(format!("{url} returned {status}. {body}")));
        }
        response.json::<T>().await.map_err(|e| VerifierError::InvalidResponse(e.to_string()))
    }
}

impl PaymentVerifier for HttpPaymentVerifier {
    async fn check_status(&self, order: &Order, method: &PaymentMethod) -> Result<PaymentCheckResult, VerifierError> {
        let url = method.check_url.as_deref().ok_or_else(|| VerifierError::NotConfigured(method.name.clone()))?;
        trace!("💳️ Asking {url} about order {}", order.order_no);
        let result = self.post::<PaymentCheckResult>(url, &PaymentQuery::new(order, method)).await?;
        if result.paid {
            debug!("💳️ {} reports order {} as paid", method.name, order.order_no);
        }
        Ok(result)
    }

    async fn refund(&self, order: &Order, method: &PaymentMethod) -> Result<RefundResult, VerifierError> {
        let url = method.refund_url.as_deref().ok_or_else(|| VerifierError::NotConfigured(method.name.clone()))?;
        info!("💳️ Requesting a refund for order {} from {}", order.order_no, method.name);
        self.post::<RefundResult>(url, &PaymentQuery::new(order, method)).await
    }
}
