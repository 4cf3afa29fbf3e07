//! Settlement and reconciliation of payments.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use common::{Actor, InvoiceId, OrderId, TransactionId};
use domain::ledger;
use domain::numbering;
use domain::{
    Document, DomainError, Invoice, Money, Order, PaymentMethod, Repository, Transaction,
    TransactionStatus, TransactionType, UnitOfWork, query,
};
use ledger_store::LedgerStore;
use notifications::{Notification, NotificationDispatcher, NotificationEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{GatewayError, PaymentError, Result};
use crate::gateway::{GatewayStatus, PaymentGateway};
use crate::receipt::ReceiptClaim;

/// Tuning for gateway calls and settlement retries.
#[derive(Debug, Clone, Copy)]
pub struct SettlementConfig {
    /// Budget for a single gateway call.
    pub gateway_timeout: Duration,

    /// Reloads after a version conflict before giving up.
    pub max_retries: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

/// Input for [`ReconciliationEngine::initialize_payment`].
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequest {
    pub invoice_id: InvoiceId,
    pub transaction_type: TransactionType,
    pub amount: Money,
}

/// Input for [`ReconciliationEngine::upload_receipt`].
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptUpload {
    pub invoice_id: InvoiceId,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub receipt_url: String,
}

/// A super-admin's verdict on a bank-transfer receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum BankTransferDecision {
    Approve,
    Reject { reason: String },
}

/// A pending card payment and where to complete it.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentInitialization {
    pub transaction: Transaction,
    pub authorization_url: String,
    pub access_code: String,
}

/// The three documents as they stand after a settlement.
#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub transaction: Transaction,
    pub order: Order,
    pub invoice: Invoice,
}

/// Result of replaying an invoice's settled transactions.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub invoice_id: InvoiceId,
    pub order_id: OrderId,
    pub drift_detected: bool,
    pub settled_transactions: usize,
    pub previous_amount_paid: Money,
    pub recomputed_amount_paid: Money,
    pub remaining_amount: Money,
}

enum Resolution {
    Completed,
    Failed { reason: String },
}

impl Resolution {
    fn outcome(&self) -> &'static str {
        match self {
            Resolution::Completed => "completed",
            Resolution::Failed { .. } => "failed",
        }
    }
}

/// Applies confirmed payments to transactions, orders and invoices.
///
/// Each settlement writes the transaction, the order and the invoice in one
/// commit guarded by all three versions. A conflict on the order or invoice
/// reloads and retries; a conflict on the transaction means another caller
/// settled it first, which the reload reports as `AlreadyProcessed`.
#[derive(Clone)]
pub struct ReconciliationEngine<S: LedgerStore, G: PaymentGateway> {
    repo: Repository<S>,
    gateway: G,
    notifier: NotificationDispatcher,
    config: SettlementConfig,
}

impl<S: LedgerStore, G: PaymentGateway> ReconciliationEngine<S, G> {
    pub fn new(store: S, gateway: G, notifier: NotificationDispatcher) -> Self {
        Self {
            repo: Repository::new(store),
            gateway,
            notifier,
            config: SettlementConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SettlementConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns a reference to the gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Creates a pending card payment and opens a gateway checkout for it.
    ///
    /// A gateway failure leaves the transaction pending.
    #[tracing::instrument(skip(self, request), fields(invoice_id = %request.invoice_id, transaction_type = %request.transaction_type))]
    pub async fn initialize_payment(
        &self,
        actor: &Actor,
        request: PaymentRequest,
    ) -> Result<PaymentInitialization> {
        let mut invoice: Invoice = self.repo.require(request.invoice_id.as_uuid()).await?;
        if !actor.can_access(invoice.user_id) {
            return Err(DomainError::unauthorized("You cannot pay this invoice").into());
        }
        ledger::validate_payment_amount(&invoice, request.transaction_type, request.amount)?;
        let amount_minor = request
            .amount
            .to_minor_units()
            .ok_or_else(|| DomainError::validation("Payment amount is out of range"))?;
        let order: Order = self.repo.require(invoice.order_id.as_uuid()).await?;

        let mut transaction = Transaction::pending(
            order.id,
            invoice.id,
            invoice.user_id,
            numbering::payment_reference(Utc::now()),
            request.amount,
            request.transaction_type,
            PaymentMethod::Paystack,
            actor.user_id,
        );
        invoice.touch();
        let mut work = UnitOfWork::new();
        work.insert(&transaction)?.update(&invoice)?;
        self.repo.commit(work).await?;
        transaction.bump_version();

        let metadata = json!({
            "order_id": order.id,
            "invoice_id": invoice.id,
            "transaction_id": transaction.id,
            "transaction_type": transaction.transaction_type,
        });
        let checkout = self
            .call_gateway(self.gateway.initialize(
                amount_minor,
                &order.customer_email,
                &transaction.reference,
                metadata,
            ))
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    reference = %transaction.reference,
                    error = %e,
                    "Payment initialization failed, transaction left pending"
                );
            })?;

        transaction.set_metadata("authorization_url", checkout.authorization_url.clone());
        transaction.set_metadata("access_code", checkout.access_code.clone());
        let mut work = UnitOfWork::new();
        work.update(&transaction)?;
        self.repo.commit(work).await?;
        transaction.bump_version();

        tracing::info!(reference = %transaction.reference, amount = %transaction.amount, "Payment initialized");
        Ok(PaymentInitialization {
            transaction,
            authorization_url: checkout.authorization_url,
            access_code: checkout.access_code,
        })
    }

    /// Confirms a card payment with the gateway and settles it.
    #[tracing::instrument(skip(self))]
    pub async fn verify_payment(&self, reference: &str) -> Result<Settlement> {
        let transaction: Transaction = self
            .repo
            .find_one(query::<Transaction>().field("reference", reference))
            .await?
            .ok_or_else(|| DomainError::not_found(Transaction::KIND, reference))?;
        transaction.ensure_pending()?;
        if transaction.payment_method != PaymentMethod::Paystack {
            return Err(DomainError::validation(
                "Bank transfers are settled through receipt verification",
            )
            .into());
        }

        let verification = self
            .call_gateway(self.gateway.verify(reference))
            .await
            .inspect_err(|e| {
                tracing::warn!(reference, error = %e, "Payment verification failed, transaction left pending");
            })?;

        let expected_minor = transaction.amount.to_minor_units();
        let resolution = match verification.status {
            GatewayStatus::Success
                if verification.amount_minor.is_none() || verification.amount_minor == expected_minor =>
            {
                Resolution::Completed
            }
            GatewayStatus::Success => Resolution::Failed {
                reason: format!(
                    "Gateway collected {} minor units, expected {}",
                    verification.amount_minor.unwrap_or_default(),
                    expected_minor.unwrap_or_default()
                ),
            },
            GatewayStatus::Failed => Resolution::Failed {
                reason: "Payment was declined by the gateway".to_string(),
            },
        };

        self.settle(transaction.id, resolution, |tx| {
            tx.set_metadata("gateway_response", verification.raw.clone());
        })
        .await
    }

    /// Records a bank-transfer receipt as a pending transaction.
    ///
    /// An invoice holds at most one pending receipt at a time.
    #[tracing::instrument(skip(self, upload), fields(invoice_id = %upload.invoice_id))]
    pub async fn upload_receipt(&self, actor: &Actor, upload: ReceiptUpload) -> Result<Transaction> {
        if upload.receipt_url.trim().is_empty() {
            return Err(DomainError::validation("A receipt URL is required").into());
        }
        let mut invoice: Invoice = self.repo.require(upload.invoice_id.as_uuid()).await?;
        if !actor.can_access(invoice.user_id) {
            return Err(DomainError::unauthorized("You cannot pay this invoice").into());
        }
        ledger::validate_payment_amount(&invoice, upload.transaction_type, upload.amount)?;

        let pending = self
            .repo
            .count(
                query::<Transaction>()
                    .field("invoice_id", invoice.id)
                    .field("status", TransactionStatus::Pending.as_str())
                    .field("payment_method", PaymentMethod::BankTransfer.as_str()),
            )
            .await?;
        if pending > 0 {
            return Err(pending_receipt_exists(&invoice));
        }

        let mut transaction = Transaction::pending(
            invoice.order_id,
            invoice.id,
            invoice.user_id,
            numbering::payment_reference(Utc::now()),
            upload.amount,
            upload.transaction_type,
            PaymentMethod::BankTransfer,
            actor.user_id,
        );
        transaction.set_metadata("receipt_url", upload.receipt_url);
        let claim = ReceiptClaim::new(invoice.id, transaction.id);

        invoice.touch();
        let mut work = UnitOfWork::new();
        work.insert(&transaction)?.insert(&claim)?.update(&invoice)?;
        match self.repo.commit(work).await {
            Ok(_) => transaction.bump_version(),
            Err(DomainError::AlreadyExists(_)) => return Err(pending_receipt_exists(&invoice)),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            reference = %transaction.reference,
            invoice_number = %invoice.invoice_number,
            "Bank transfer receipt uploaded"
        );
        self.notifier.dispatch(
            Notification::new(
                NotificationEvent::ReceiptUploaded,
                json!({
                    "transaction_id": transaction.id,
                    "reference": transaction.reference,
                    "invoice_id": invoice.id,
                    "invoice_number": invoice.invoice_number,
                    "amount": transaction.amount,
                    "receipt_url": transaction.metadata.get("receipt_url"),
                }),
            )
            .to_admins(),
        );

        Ok(transaction)
    }

    /// Approves or rejects a bank-transfer receipt.
    #[tracing::instrument(skip(self, decision))]
    pub async fn verify_bank_transfer(
        &self,
        actor: &Actor,
        transaction_id: TransactionId,
        decision: BankTransferDecision,
    ) -> Result<Settlement> {
        if !actor.role.is_super_admin() {
            return Err(
                DomainError::unauthorized("Only super admins can verify bank transfers").into(),
            );
        }
        let transaction: Transaction = self.repo.require(transaction_id.as_uuid()).await?;
        if transaction.payment_method != PaymentMethod::BankTransfer {
            return Err(DomainError::validation("Transaction is not a bank transfer").into());
        }
        transaction.ensure_pending()?;

        let resolution = match decision {
            BankTransferDecision::Approve => Resolution::Completed,
            BankTransferDecision::Reject { reason } => Resolution::Failed { reason },
        };
        let verifier = actor.user_id;
        self.settle(transaction_id, resolution, move |tx| {
            tx.set_metadata("verified_by", verifier.to_string());
        })
        .await
    }

    /// Rebuilds an invoice's and its order's paid amounts from completed
    /// transactions, repairing any drift.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, actor: &Actor, invoice_id: InvoiceId) -> Result<ReconciliationReport> {
        if !actor.role.is_admin() {
            return Err(DomainError::unauthorized("Only admins can reconcile invoices").into());
        }

        for attempt in 0..=self.config.max_retries {
            let mut invoice: Invoice = self.repo.require(invoice_id.as_uuid()).await?;
            let mut order: Order = self.repo.require(invoice.order_id.as_uuid()).await?;
            let transactions: Vec<Transaction> = self
                .repo
                .find(query::<Transaction>().field("invoice_id", invoice.id))
                .await?;
            let previous_amount_paid = invoice.amount_paid;

            let drift =
                ledger::replay_settlements(&mut order, &mut invoice, &transactions, Utc::now());
            let report = ReconciliationReport {
                invoice_id,
                order_id: order.id,
                drift_detected: drift,
                settled_transactions: invoice.transactions.len(),
                previous_amount_paid,
                recomputed_amount_paid: invoice.amount_paid,
                remaining_amount: invoice.remaining_amount,
            };
            if !drift {
                return Ok(report);
            }

            let mut work = UnitOfWork::new();
            work.update(&order)?.update(&invoice)?;
            match self.repo.commit(work).await {
                Ok(_) => {
                    tracing::warn!(
                        invoice_number = %invoice.invoice_number,
                        previous = %previous_amount_paid,
                        recomputed = %invoice.amount_paid,
                        "Ledger drift repaired"
                    );
                    metrics::counter!("reconciliation_repairs_total").increment(1);
                    return Ok(report);
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(attempt, "Reconciliation conflicted, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DomainError::Conflict {
            kind: Invoice::KIND.to_string(),
            id: invoice_id.as_uuid(),
        }
        .into())
    }

    async fn call_gateway<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, GatewayError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.gateway_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PaymentError::GatewayUnavailable(format!(
                "no answer within {}s",
                self.config.gateway_timeout.as_secs_f32()
            ))),
        }
    }

    /// Settles a pending transaction, retrying on version conflicts.
    async fn settle(
        &self,
        transaction_id: TransactionId,
        resolution: Resolution,
        annotate: impl Fn(&mut Transaction),
    ) -> Result<Settlement> {
        for attempt in 0..=self.config.max_retries {
            let mut transaction: Transaction =
                self.repo.require(transaction_id.as_uuid()).await?;
            transaction.ensure_pending()?;
            let mut invoice: Invoice = self.repo.require(transaction.invoice_id.as_uuid()).await?;
            let mut order: Order = self.repo.require(transaction.order_id.as_uuid()).await?;

            let now = Utc::now();
            annotate(&mut transaction);
            let mut work = UnitOfWork::new();
            match &resolution {
                Resolution::Completed => {
                    if transaction.amount > invoice.total_amount - invoice.amount_paid {
                        tracing::warn!(
                            reference = %transaction.reference,
                            amount = %transaction.amount,
                            outstanding = %(invoice.total_amount - invoice.amount_paid),
                            "Settled amount exceeds the outstanding balance and will be clamped"
                        );
                    }
                    transaction.complete(now);
                    ledger::apply_settled_payment(
                        &mut order,
                        &mut invoice,
                        transaction.amount,
                        transaction.transaction_type,
                        transaction.id,
                        now,
                    );
                    work.update(&transaction)?.update(&order)?.update(&invoice)?;
                }
                Resolution::Failed { reason } => {
                    transaction.set_metadata("failure_reason", reason.clone());
                    transaction.fail(now);
                    work.update(&transaction)?;
                }
            }
            if transaction.payment_method == PaymentMethod::BankTransfer {
                let claim = self
                    .repo
                    .load::<ReceiptClaim>(transaction.invoice_id.as_uuid())
                    .await?;
                if let Some(claim) = claim.filter(|c| c.transaction_id == transaction.id) {
                    work.delete(&claim);
                }
            }

            match self.repo.commit(work).await {
                Ok(_) => {
                    transaction.bump_version();
                    if matches!(resolution, Resolution::Completed) {
                        order.bump_version();
                        invoice.bump_version();
                    }
                    metrics::counter!("payments_settled_total", "outcome" => resolution.outcome())
                        .increment(1);
                    tracing::info!(
                        reference = %transaction.reference,
                        outcome = resolution.outcome(),
                        amount_paid = %invoice.amount_paid,
                        remaining = %invoice.remaining_amount,
                        "Payment settled"
                    );
                    self.notify_settlement(&transaction, &order, &invoice, &resolution);
                    return Ok(Settlement {
                        transaction,
                        order,
                        invoice,
                    });
                }
                Err(e) if e.is_conflict() => {
                    metrics::counter!("settlement_conflicts_total").increment(1);
                    tracing::debug!(attempt, reference = %transaction.reference, "Settlement conflicted, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(DomainError::Conflict {
            kind: Transaction::KIND.to_string(),
            id: transaction_id.as_uuid(),
        }
        .into())
    }

    fn notify_settlement(
        &self,
        transaction: &Transaction,
        order: &Order,
        invoice: &Invoice,
        resolution: &Resolution,
    ) {
        let notification = match resolution {
            Resolution::Completed => Notification::new(
                NotificationEvent::PaymentSettled,
                json!({
                    "transaction_id": transaction.id,
                    "reference": transaction.reference,
                    "order_number": order.order_number,
                    "invoice_number": invoice.invoice_number,
                    "amount": transaction.amount,
                    "amount_paid": invoice.amount_paid,
                    "remaining_amount": invoice.remaining_amount,
                    "invoice_status": invoice.status,
                    "payment_status": order.payment_status,
                }),
            )
            .to_user(order.user_id)
            .to_admins()
            .with_email("payment_receipt", order.customer_email.clone()),
            Resolution::Failed { reason } => Notification::new(
                NotificationEvent::PaymentFailed,
                json!({
                    "transaction_id": transaction.id,
                    "reference": transaction.reference,
                    "order_number": order.order_number,
                    "amount": transaction.amount,
                    "reason": reason,
                }),
            )
            .to_user(order.user_id)
            .to_admins()
            .with_email("payment_failed", order.customer_email.clone()),
        };
        self.notifier.dispatch(notification);
    }
}

fn pending_receipt_exists(invoice: &Invoice) -> PaymentError {
    DomainError::AlreadyExists(format!(
        "Invoice {} already has a bank transfer awaiting verification",
        invoice.invoice_number
    ))
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;
    use domain::{InvoiceService, NewInvoice, NewOrder, OrderItem, OrderService};
    use ledger_store::InMemoryLedgerStore;

    use crate::gateway::InMemoryPaymentGateway;

    async fn invoiced(
        store: &InMemoryLedgerStore,
        invoice: NewInvoice,
    ) -> (Actor, Invoice) {
        let customer = Actor::customer(UserId::new());
        let admin = Actor::admin(UserId::new());
        let order = OrderService::new(store.clone(), NotificationDispatcher::noop())
            .create_order(
                &customer,
                NewOrder {
                    user_id: None,
                    customer_email: "jane@example.com".to_string(),
                    items: vec![OrderItem::new("poster", "Poster", 1, Money::from_major(1000))],
                    discount: None,
                },
            )
            .await
            .unwrap();
        let invoice = InvoiceService::new(store.clone(), NotificationDispatcher::noop())
            .create_invoice(&admin, order.id, invoice)
            .await
            .unwrap();
        (customer, invoice)
    }

    fn engine(
        store: &InMemoryLedgerStore,
    ) -> ReconciliationEngine<InMemoryLedgerStore, InMemoryPaymentGateway> {
        ReconciliationEngine::new(
            store.clone(),
            InMemoryPaymentGateway::new(),
            NotificationDispatcher::noop(),
        )
    }

    #[tokio::test]
    async fn initialize_scales_to_minor_units() {
        let store = InMemoryLedgerStore::new();
        let (customer, invoice) = invoiced(&store, NewInvoice::part()).await;
        let engine = engine(&store);

        let init = engine
            .initialize_payment(
                &customer,
                PaymentRequest {
                    invoice_id: invoice.id,
                    transaction_type: TransactionType::Part,
                    amount: Money::from_major(300),
                },
            )
            .await
            .unwrap();

        assert_eq!(init.transaction.status, TransactionStatus::Pending);
        assert_eq!(
            engine.gateway().checkout_amount(&init.transaction.reference).await,
            Some(30_000)
        );
        assert!(init.transaction.metadata.contains_key("access_code"));
    }

    #[tokio::test]
    async fn initialize_rejects_wrong_amount_and_strangers() {
        let store = InMemoryLedgerStore::new();
        let (_, invoice) = invoiced(&store, NewInvoice::full()).await;
        let engine = engine(&store);

        let err = engine
            .initialize_payment(
                &Actor::customer(UserId::new()),
                PaymentRequest {
                    invoice_id: invoice.id,
                    transaction_type: TransactionType::Final,
                    amount: Money::from_major(1000),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::Unauthorized);

        let err = engine
            .initialize_payment(
                &Actor::admin(UserId::new()),
                PaymentRequest {
                    invoice_id: invoice.id,
                    transaction_type: TransactionType::Final,
                    amount: Money::from_major(999),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::AmountMismatch);
        assert_eq!(store.document_count().await, 2);
    }

    #[tokio::test]
    async fn verify_bank_transfer_requires_super_admin() {
        let store = InMemoryLedgerStore::new();
        let (customer, invoice) = invoiced(&store, NewInvoice::full()).await;
        let engine = engine(&store);
        let tx = engine
            .upload_receipt(
                &customer,
                ReceiptUpload {
                    invoice_id: invoice.id,
                    transaction_type: TransactionType::Final,
                    amount: Money::from_major(1000),
                    receipt_url: "https://files.example.com/receipt.jpg".to_string(),
                },
            )
            .await
            .unwrap();

        let err = engine
            .verify_bank_transfer(&Actor::admin(UserId::new()), tx.id, BankTransferDecision::Approve)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn card_payments_are_not_verified_as_receipts() {
        let store = InMemoryLedgerStore::new();
        let (customer, invoice) = invoiced(&store, NewInvoice::full()).await;
        let engine = engine(&store);
        let init = engine
            .initialize_payment(
                &customer,
                PaymentRequest {
                    invoice_id: invoice.id,
                    transaction_type: TransactionType::Final,
                    amount: Money::from_major(1000),
                },
            )
            .await
            .unwrap();

        let err = engine
            .verify_bank_transfer(
                &Actor::super_admin(UserId::new()),
                init.transaction.id,
                BankTransferDecision::Approve,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), common::ErrorKind::ValidationError);
    }

    #[test]
    fn decision_wire_format() {
        let approve: BankTransferDecision =
            serde_json::from_str(r#"{"decision":"approve"}"#).unwrap();
        assert_eq!(approve, BankTransferDecision::Approve);
        let reject: BankTransferDecision =
            serde_json::from_str(r#"{"decision":"reject","reason":"Blurry receipt"}"#).unwrap();
        assert_eq!(
            reject,
            BankTransferDecision::Reject {
                reason: "Blurry receipt".to_string()
            }
        );
    }
}
