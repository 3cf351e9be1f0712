use fulfillment_engine::{
    db_types::{Order, PaymentMethod},
    traits::{PaymentCheckResult, PaymentVerifier, RefundResult, VerifierError},
};
use mockall::mock;

mock! {
    pub Verifier {}
    impl PaymentVerifier for Verifier {
        async fn check_status(
            &self,
            order: &Order,
            method: &PaymentMethod,
        ) -> Result<PaymentCheckResult, VerifierError>;
        async fn refund(&self, order: &Order, method: &PaymentMethod) -> Result<RefundResult, VerifierError>;
    }
}
