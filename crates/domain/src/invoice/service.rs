//! Invoice creation, lookup and deletion.

use chrono::{DateTime, Duration, Utc};
use common::{Actor, InvoiceId, OrderId};
use ledger_store::{LedgerStore, Version};
use notifications::{Notification, NotificationDispatcher, NotificationEvent};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::document::{Document, Repository, UnitOfWork, query};
use crate::error::DomainError;
use crate::ledger::{self, DEFAULT_DEPOSIT_PERCENT};
use crate::money::Money;
use crate::numbering;
use crate::order::{Order, OrderStatus, RequiredPaymentType};
use crate::transaction::{Transaction, TransactionStatus};

use super::{Invoice, InvoiceStatus, InvoiceType};

const DEFAULT_DUE_DAYS: i64 = 7;

/// Input for [`InvoiceService::create_invoice`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    pub payment_type: RequiredPaymentType,

    /// Deposit for a part-payment invoice; a share of the total when unset.
    #[serde(default)]
    pub deposit_amount: Option<Money>,

    /// Overrides the order's discount.
    #[serde(default)]
    pub discount: Option<Money>,

    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub invoice_type: InvoiceType,
}

impl NewInvoice {
    pub fn full() -> Self {
        Self::new(RequiredPaymentType::Full)
    }

    pub fn part() -> Self {
        Self::new(RequiredPaymentType::Part)
    }

    fn new(payment_type: RequiredPaymentType) -> Self {
        Self {
            payment_type,
            deposit_amount: None,
            discount: None,
            due_date: None,
            invoice_type: InvoiceType::Main,
        }
    }

    pub fn with_deposit(mut self, deposit: Money) -> Self {
        self.deposit_amount = Some(deposit);
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = Some(discount);
        self
    }
}

/// Service for invoices.
///
/// An invoice is created once per order; the invoice insert and the order
/// update commit together, guarded by the order's version.
#[derive(Clone)]
pub struct InvoiceService<S: LedgerStore> {
    repo: Repository<S>,
    notifier: NotificationDispatcher,
    deposit_percent: Decimal,
}

impl<S: LedgerStore> InvoiceService<S> {
    pub fn new(store: S, notifier: NotificationDispatcher) -> Self {
        Self {
            repo: Repository::new(store),
            notifier,
            deposit_percent: DEFAULT_DEPOSIT_PERCENT,
        }
    }

    /// Sets the deposit share used when an invoice names no deposit.
    pub fn with_deposit_percent(mut self, percent: Decimal) -> Self {
        self.deposit_percent = percent;
        self
    }

    pub fn deposit_percent(&self) -> Decimal {
        self.deposit_percent
    }

    /// Creates the invoice for an order and moves the order to `InvoiceSent`.
    #[tracing::instrument(skip(self, input), fields(payment_type = %input.payment_type))]
    pub async fn create_invoice(
        &self,
        actor: &Actor,
        order_id: OrderId,
        input: NewInvoice,
    ) -> Result<Invoice, DomainError> {
        if !actor.role.is_admin() {
            return Err(DomainError::unauthorized("Only admins can create invoices"));
        }

        let mut order: Order = self.repo.require(order_id.as_uuid()).await?;
        if order.invoice_id.is_some() || self.invoice_for_order(order_id).await?.is_some() {
            return Err(DomainError::AlreadyExists(format!(
                "Order {} already has an invoice",
                order.order_number
            )));
        }
        if order.status.is_terminal() {
            return Err(DomainError::invalid_state(format!(
                "Cannot invoice an order that is {}",
                order.status
            )));
        }

        let items = Invoice::lines_for(&order);
        let subtotal: Money = items.iter().map(|item| item.total).sum();
        let discount = input.discount.unwrap_or(order.discount);
        if discount.is_negative() || discount > subtotal {
            return Err(DomainError::validation(format!(
                "Discount must be between 0 and {subtotal}"
            )));
        }
        let total = subtotal - discount;
        if !total.is_positive() {
            return Err(DomainError::validation("Invoice total must be greater than 0"));
        }

        let deposit = match input.payment_type {
            RequiredPaymentType::Part => {
                let deposit = ledger::deposit_for(total, input.deposit_amount, self.deposit_percent);
                if !deposit.is_positive() || deposit >= total {
                    return Err(DomainError::validation(format!(
                        "Deposit must be greater than 0 and less than {total}"
                    )));
                }
                deposit
            }
            RequiredPaymentType::Full => Money::ZERO,
        };

        let now = Utc::now();
        let mut invoice = Invoice {
            id: InvoiceId::new(),
            order_id,
            user_id: order.user_id,
            invoice_number: numbering::invoice_number(now),
            invoice_type: input.invoice_type,
            items,
            subtotal,
            discount,
            total_amount: total,
            payment_type: input.payment_type,
            deposit_amount: deposit,
            amount_paid: Money::ZERO,
            remaining_amount: ledger::invoice_remaining(total, Money::ZERO, input.payment_type, deposit),
            status: InvoiceStatus::Draft,
            due_date: input.due_date.unwrap_or(now + Duration::days(DEFAULT_DUE_DAYS)),
            paid_at: None,
            transactions: Vec::new(),
            created_by: actor.user_id,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        };

        order.invoice_id = Some(invoice.id);
        order.required_payment_type = Some(input.payment_type);
        order.required_deposit = match input.payment_type {
            RequiredPaymentType::Part => Some(deposit),
            RequiredPaymentType::Full => None,
        };
        order.discount = discount;
        order.total_amount = total;
        order.remaining_balance = (total - order.amount_paid).non_negative();
        order.set_status(OrderStatus::InvoiceSent);

        let mut work = UnitOfWork::new();
        work.insert(&invoice)?.update(&order)?;
        if let Err(e) = self.repo.commit(work).await {
            return Err(self.explain_invoice_conflict(order_id, e).await);
        }
        invoice.bump_version();

        metrics::counter!("invoices_created_total").increment(1);
        tracing::info!(
            invoice_number = %invoice.invoice_number,
            order_number = %order.order_number,
            total = %invoice.total_amount,
            "Invoice created"
        );

        let payload = json!({
            "invoice_id": invoice.id,
            "invoice_number": invoice.invoice_number,
            "order_id": order.id,
            "order_number": order.order_number,
            "total_amount": invoice.total_amount,
            "deposit_amount": invoice.deposit_amount,
            "payment_type": invoice.payment_type,
            "due_date": invoice.due_date,
        });
        self.notifier.dispatch(
            Notification::new(NotificationEvent::InvoiceCreated, payload)
                .to_user(order.user_id)
                .to_admins()
                .with_email("invoice_created", order.customer_email.clone()),
        );

        Ok(invoice)
    }

    /// A lost race on the order's version means another invoice won.
    async fn explain_invoice_conflict(&self, order_id: OrderId, error: DomainError) -> DomainError {
        if !error.is_conflict() {
            return error;
        }
        match self.repo.load::<Order>(order_id.as_uuid()).await {
            Ok(Some(order)) if order.invoice_id.is_some() => DomainError::AlreadyExists(format!(
                "Order {} already has an invoice",
                order.order_number
            )),
            _ => error,
        }
    }

    async fn invoice_for_order(&self, order_id: OrderId) -> Result<Option<Invoice>, DomainError> {
        self.repo
            .find_one(query::<Invoice>().field("order_id", order_id))
            .await
    }

    /// Loads an invoice visible to the actor.
    #[tracing::instrument(skip(self))]
    pub async fn get_invoice(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, DomainError> {
        let invoice: Invoice = self.repo.require(invoice_id.as_uuid()).await?;
        if !actor.can_access(invoice.user_id) {
            return Err(DomainError::unauthorized("You cannot view this invoice"));
        }
        Ok(invoice)
    }

    /// Loads the invoice of an order.
    #[tracing::instrument(skip(self))]
    pub async fn get_invoice_for_order(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<Invoice, DomainError> {
        let order: Order = self.repo.require(order_id.as_uuid()).await?;
        if !actor.can_access(order.user_id) {
            return Err(DomainError::unauthorized("You cannot view this order"));
        }
        self.invoice_for_order(order_id)
            .await?
            .ok_or_else(|| DomainError::not_found(Invoice::KIND, format!("for order {order_id}")))
    }

    /// Deletes a draft invoice and unlinks it from its order.
    #[tracing::instrument(skip(self))]
    pub async fn delete_invoice(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
    ) -> Result<(), DomainError> {
        if !actor.role.is_admin() {
            return Err(DomainError::unauthorized("Only admins can delete invoices"));
        }

        let invoice: Invoice = self.repo.require(invoice_id.as_uuid()).await?;
        if invoice.status != InvoiceStatus::Draft {
            return Err(DomainError::invalid_state(format!(
                "Invoice {} is {} and can no longer be deleted",
                invoice.invoice_number, invoice.status
            )));
        }
        let pending = self
            .repo
            .count(
                query::<Transaction>()
                    .field("invoice_id", invoice_id)
                    .field("status", TransactionStatus::Pending.as_str()),
            )
            .await?;
        if pending > 0 {
            return Err(DomainError::invalid_state(format!(
                "Invoice {} has payments awaiting settlement",
                invoice.invoice_number
            )));
        }

        let mut work = UnitOfWork::new();
        work.delete(&invoice);

        let order = self.repo.load::<Order>(invoice.order_id.as_uuid()).await?;
        if let Some(mut order) = order.filter(|o| o.invoice_id == Some(invoice.id)) {
            order.invoice_id = None;
            order.required_payment_type = None;
            order.required_deposit = None;
            if order.status == OrderStatus::InvoiceSent {
                order.set_status(OrderStatus::OrderReceived);
            } else {
                order.touch();
            }
            work.update(&order)?;
        }
        self.repo.commit(work).await?;

        tracing::info!(invoice_number = %invoice.invoice_number, "Invoice deleted");
        self.notifier.dispatch(
            Notification::new(
                NotificationEvent::InvoiceDeleted,
                json!({
                    "invoice_id": invoice.id,
                    "invoice_number": invoice.invoice_number,
                    "order_id": invoice.order_id,
                }),
            )
            .to_user(invoice.user_id),
        );
        Ok(())
    }

    /// Lists every payment attempt against an invoice, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        actor: &Actor,
        invoice_id: InvoiceId,
    ) -> Result<Vec<Transaction>, DomainError> {
        let invoice = self.get_invoice(actor, invoice_id).await?;
        self.repo
            .find(query::<Transaction>().field("invoice_id", invoice.id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::UserId;
    use ledger_store::InMemoryLedgerStore;
    use rust_decimal_macros::dec;

    use crate::order::{OrderItem, PaymentStatus};

    async fn seeded_order(store: &InMemoryLedgerStore, total: i64) -> Order {
        let order = Order::place(
            UserId::new(),
            "jane@example.com",
            vec![OrderItem::new("tee", "T-shirt", 2, Money::from_major(total / 2))],
            Money::ZERO,
        )
        .unwrap();
        let repo = Repository::new(store.clone());
        let mut work = UnitOfWork::new();
        work.insert(&order).unwrap();
        repo.commit(work).await.unwrap();
        repo.require(order.id.as_uuid()).await.unwrap()
    }

    fn service(store: &InMemoryLedgerStore) -> InvoiceService<InMemoryLedgerStore> {
        InvoiceService::new(store.clone(), NotificationDispatcher::noop())
    }

    #[tokio::test]
    async fn part_invoice_takes_default_deposit() {
        let store = InMemoryLedgerStore::new();
        let order = seeded_order(&store, 1000).await;
        let admin = Actor::admin(UserId::new());

        let invoice = service(&store)
            .create_invoice(&admin, order.id, NewInvoice::part())
            .await
            .unwrap();

        assert_eq!(invoice.total_amount, Money::from_major(1000));
        assert_eq!(invoice.deposit_amount, Money::from_major(300));
        assert_eq!(invoice.remaining_amount, Money::from_major(700));
        assert_eq!(invoice.status, InvoiceStatus::Draft);
        assert_eq!(invoice.version, Version::first());
        assert!(invoice.invoice_number.starts_with("INV-"));

        let order: Order = Repository::new(store).require(order.id.as_uuid()).await.unwrap();
        assert_eq!(order.status, OrderStatus::InvoiceSent);
        assert_eq!(order.invoice_id, Some(invoice.id));
        assert_eq!(order.required_payment_type, Some(RequiredPaymentType::Part));
        assert_eq!(order.required_deposit, Some(Money::from_major(300)));
        assert_eq!(order.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn configured_deposit_percent_and_explicit_discount() {
        let store = InMemoryLedgerStore::new();
        let order = seeded_order(&store, 1000).await;
        let admin = Actor::super_admin(UserId::new());

        let invoice = service(&store)
            .with_deposit_percent(dec!(50))
            .create_invoice(
                &admin,
                order.id,
                NewInvoice::part().with_discount(Money::from_major(200)),
            )
            .await
            .unwrap();

        assert_eq!(invoice.subtotal, Money::from_major(1000));
        assert_eq!(invoice.total_amount, Money::from_major(800));
        assert_eq!(invoice.deposit_amount, Money::from_major(400));

        let order: Order = Repository::new(store).require(order.id.as_uuid()).await.unwrap();
        assert_eq!(order.total_amount, Money::from_major(800));
        assert!(order.ledger_is_consistent());
    }

    #[tokio::test]
    async fn rejects_customers_and_bad_deposits() {
        let store = InMemoryLedgerStore::new();
        let order = seeded_order(&store, 1000).await;
        let service = service(&store);

        let err = service
            .create_invoice(&Actor::customer(order.user_id), order.id, NewInvoice::full())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));

        let admin = Actor::admin(UserId::new());
        let err = service
            .create_invoice(
                &admin,
                order.id,
                NewInvoice::part().with_deposit(Money::from_major(1000)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = service
            .create_invoice(&admin, OrderId::new(), NewInvoice::full())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { kind: "Order", .. }));
    }

    #[tokio::test]
    async fn duplicate_invoice_is_rejected() {
        let store = InMemoryLedgerStore::new();
        let order = seeded_order(&store, 1000).await;
        let admin = Actor::admin(UserId::new());
        let service = service(&store);

        let first = service
            .create_invoice(&admin, order.id, NewInvoice::full())
            .await
            .unwrap();
        let before = store.document_count().await;

        let err = service
            .create_invoice(&admin, order.id, NewInvoice::part())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyExists(_)));
        assert_eq!(store.document_count().await, before);

        let invoice = service
            .get_invoice_for_order(&Actor::customer(order.user_id), order.id)
            .await
            .unwrap();
        assert_eq!(invoice.id, first.id);
        assert_eq!(invoice.payment_type, RequiredPaymentType::Full);
    }

    #[tokio::test]
    async fn terminal_order_cannot_be_invoiced() {
        let store = InMemoryLedgerStore::new();
        let mut order = seeded_order(&store, 100).await;
        let repo = Repository::new(store.clone());
        order.set_status(OrderStatus::Cancelled);
        let mut work = UnitOfWork::new();
        work.update(&order).unwrap();
        repo.commit(work).await.unwrap();

        let err = service(&store)
            .create_invoice(&Actor::admin(UserId::new()), order.id, NewInvoice::full())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidOrderState(_)));
    }

    #[tokio::test]
    async fn delete_draft_unlinks_order() {
        let store = InMemoryLedgerStore::new();
        let order = seeded_order(&store, 1000).await;
        let admin = Actor::admin(UserId::new());
        let service = service(&store);

        let invoice = service
            .create_invoice(&admin, order.id, NewInvoice::part())
            .await
            .unwrap();
        service.delete_invoice(&admin, invoice.id).await.unwrap();

        let order: Order = Repository::new(store).require(order.id.as_uuid()).await.unwrap();
        assert_eq!(order.status, OrderStatus::OrderReceived);
        assert!(order.invoice_id.is_none());
        assert!(order.required_deposit.is_none());

        let err = service.get_invoice(&admin, invoice.id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { kind: "Invoice", .. }));

        // The order can be invoiced again.
        service
            .create_invoice(&admin, order.id, NewInvoice::full())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn other_customers_cannot_read_invoice() {
        let store = InMemoryLedgerStore::new();
        let order = seeded_order(&store, 1000).await;
        let service = service(&store);
        let invoice = service
            .create_invoice(&Actor::admin(UserId::new()), order.id, NewInvoice::full())
            .await
            .unwrap();

        let err = service
            .get_invoice(&Actor::customer(UserId::new()), invoice.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));

        let txs = service
            .list_transactions(&Actor::customer(order.user_id), invoice.id)
            .await
            .unwrap();
        assert!(txs.is_empty());
    }
}
