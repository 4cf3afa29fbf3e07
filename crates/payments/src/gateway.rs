//! Payment gateway port and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::GatewayError;

/// Checkout session returned when a payment is initialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCheckout {
    pub authorization_url: String,
    pub access_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Success,
    Failed,
}

/// The gateway's view of a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayVerification {
    pub status: GatewayStatus,

    /// Amount the gateway actually collected, in minor units.
    pub amount_minor: Option<i64>,

    /// Gateway response body, kept on the transaction.
    pub raw: serde_json::Value,
}

/// Trait for card payment gateways.
///
/// Amounts cross this boundary in minor units only.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a checkout session for `amount_minor`.
    async fn initialize(
        &self,
        amount_minor: i64,
        email: &str,
        reference: &str,
        metadata: serde_json::Value,
    ) -> Result<GatewayCheckout, GatewayError>;

    /// Looks up the outcome of a payment by reference.
    async fn verify(&self, reference: &str) -> Result<GatewayVerification, GatewayError>;
}

#[async_trait]
impl<G: PaymentGateway + ?Sized> PaymentGateway for Arc<G> {
    async fn initialize(
        &self,
        amount_minor: i64,
        email: &str,
        reference: &str,
        metadata: serde_json::Value,
    ) -> Result<GatewayCheckout, GatewayError> {
        (**self).initialize(amount_minor, email, reference, metadata).await
    }

    async fn verify(&self, reference: &str) -> Result<GatewayVerification, GatewayError> {
        (**self).verify(reference).await
    }
}

/// Gateway used when no card processor is configured.
///
/// Every call fails as unreachable, so card payments stay pending and
/// nothing is ever settled without a processor confirming it.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredPaymentGateway;

#[async_trait]
impl PaymentGateway for UnconfiguredPaymentGateway {
    async fn initialize(
        &self,
        _amount_minor: i64,
        _email: &str,
        _reference: &str,
        _metadata: serde_json::Value,
    ) -> Result<GatewayCheckout, GatewayError> {
        Err(GatewayError::Unreachable("no payment gateway is configured".to_string()))
    }

    async fn verify(&self, _reference: &str) -> Result<GatewayVerification, GatewayError> {
        Err(GatewayError::Unreachable("no payment gateway is configured".to_string()))
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    checkouts: HashMap<String, i64>,
    outcomes: HashMap<String, GatewayStatus>,
    fail: bool,
    delay: Option<Duration>,
}

/// In-memory gateway for tests and sandbox runs.
///
/// Every initialized payment verifies as successful unless an outcome was
/// set for its reference. Checkouts live only as long as the process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail as unreachable.
    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }

    /// Delays every subsequent call.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delay = delay;
    }

    /// Sets the verification outcome for a reference.
    pub async fn set_outcome(&self, reference: &str, status: GatewayStatus) {
        self.state
            .write()
            .await
            .outcomes
            .insert(reference.to_string(), status);
    }

    /// Returns the amount a reference was initialized with.
    pub async fn checkout_amount(&self, reference: &str) -> Option<i64> {
        self.state.read().await.checkouts.get(reference).copied()
    }

    async fn before_call(&self) -> Result<(), GatewayError> {
        let (delay, fail) = {
            let state = self.state.read().await;
            (state.delay, state.fail)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(GatewayError::Unreachable("gateway returned 503".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn initialize(
        &self,
        amount_minor: i64,
        email: &str,
        reference: &str,
        _metadata: serde_json::Value,
    ) -> Result<GatewayCheckout, GatewayError> {
        self.before_call().await?;
        if amount_minor <= 0 {
            return Err(GatewayError::Rejected("amount must be positive".to_string()));
        }
        if email.is_empty() {
            return Err(GatewayError::Rejected("email is required".to_string()));
        }

        self.state
            .write()
            .await
            .checkouts
            .insert(reference.to_string(), amount_minor);

        Ok(GatewayCheckout {
            authorization_url: format!("https://checkout.local/{reference}"),
            access_code: format!("AC-{reference}"),
        })
    }

    async fn verify(&self, reference: &str) -> Result<GatewayVerification, GatewayError> {
        self.before_call().await?;
        let state = self.state.read().await;

        let Some(amount) = state.checkouts.get(reference).copied() else {
            return Ok(GatewayVerification {
                status: GatewayStatus::Failed,
                amount_minor: None,
                raw: serde_json::json!({ "reference": reference, "message": "Transaction not found" }),
            });
        };
        let status = state
            .outcomes
            .get(reference)
            .copied()
            .unwrap_or(GatewayStatus::Success);

        Ok(GatewayVerification {
            status,
            amount_minor: Some(amount),
            raw: serde_json::json!({
                "reference": reference,
                "status": status,
                "amount": amount,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_then_verify() {
        let gateway = InMemoryPaymentGateway::new();
        let checkout = gateway
            .initialize(30_000, "jane@example.com", "PAY-1", serde_json::Value::Null)
            .await
            .unwrap();
        assert!(checkout.authorization_url.ends_with("PAY-1"));
        assert_eq!(gateway.checkout_amount("PAY-1").await, Some(30_000));

        let verification = gateway.verify("PAY-1").await.unwrap();
        assert_eq!(verification.status, GatewayStatus::Success);
        assert_eq!(verification.amount_minor, Some(30_000));
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_is_unreachable() {
        let gateway: Arc<dyn PaymentGateway> = Arc::new(UnconfiguredPaymentGateway);
        assert!(matches!(
            gateway
                .initialize(100, "a@b.c", "PAY-3", serde_json::Value::Null)
                .await,
            Err(GatewayError::Unreachable(_))
        ));
        assert!(matches!(
            gateway.verify("PAY-3").await,
            Err(GatewayError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_shared_gateway_delegates() {
        let inner = InMemoryPaymentGateway::new();
        let shared: Arc<dyn PaymentGateway> = Arc::new(inner.clone());
        shared
            .initialize(500, "a@b.c", "PAY-4", serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(inner.checkout_amount("PAY-4").await, Some(500));
    }

    #[tokio::test]
    async fn test_unknown_reference_fails() {
        let gateway = InMemoryPaymentGateway::new();
        let verification = gateway.verify("PAY-404").await.unwrap();
        assert_eq!(verification.status, GatewayStatus::Failed);
    }

    #[tokio::test]
    async fn test_configured_outcome_and_failure() {
        let gateway = InMemoryPaymentGateway::new();
        gateway
            .initialize(100, "a@b.c", "PAY-2", serde_json::Value::Null)
            .await
            .unwrap();
        gateway.set_outcome("PAY-2", GatewayStatus::Failed).await;
        assert_eq!(
            gateway.verify("PAY-2").await.unwrap().status,
            GatewayStatus::Failed
        );

        gateway.set_fail(true).await;
        assert!(matches!(
            gateway.verify("PAY-2").await,
            Err(GatewayError::Unreachable(_))
        ));
    }
}
