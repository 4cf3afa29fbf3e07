//! Order document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{InvoiceId, OrderId, ShippingId, UserId};
use ledger_store::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{Document, lookup_fields};
use crate::error::DomainError;
use crate::money::Money;
use crate::numbering;

use super::{OrderStatus, PaymentStatus, RequiredPaymentType};

/// A line on an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Catalog product reference.
    pub product_id: String,

    /// Product name at the time of ordering.
    pub product_name: String,

    pub quantity: u32,

    pub unit_price: Money,

    /// Full product record as it looked when the order was placed.
    #[serde(default)]
    pub product_snapshot: serde_json::Value,
}

impl OrderItem {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
            product_snapshot: serde_json::Value::Null,
        }
    }

    /// Returns quantity × unit price.
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// Order root document.
///
/// Holds the customer's items and the order-side view of the payment
/// ledger. `remaining_balance` is always `total_amount - amount_paid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,

    /// Customer email at the time of ordering.
    pub customer_email: String,

    pub items: Vec<OrderItem>,
    pub discount: Money,
    pub total_amount: Money,
    pub amount_paid: Money,
    pub remaining_balance: Money,

    /// Unset until an invoice is created.
    pub required_payment_type: Option<RequiredPaymentType>,

    /// Only set under a part-payment policy.
    pub required_deposit: Option<Money>,

    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub invoice_id: Option<InvoiceId>,
    pub shipping_id: Option<ShippingId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub version: Version,
}

impl Order {
    /// Creates a new order in `OrderReceived` after validating its lines.
    pub fn place(
        user_id: UserId,
        customer_email: impl Into<String>,
        items: Vec<OrderItem>,
        discount: Money,
    ) -> Result<Self, DomainError> {
        let customer_email = customer_email.into();
        if customer_email.trim().is_empty() {
            return Err(DomainError::validation("Customer email is required"));
        }
        if items.is_empty() {
            return Err(DomainError::validation("An order needs at least one item"));
        }
        for item in &items {
            if item.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "Quantity for {} must be greater than 0",
                    item.product_name
                )));
            }
            if !item.unit_price.is_positive() {
                return Err(DomainError::validation(format!(
                    "Unit price for {} must be greater than 0",
                    item.product_name
                )));
            }
        }

        // Totals must stay payable through the gateway in minor units.
        let lines: Option<Vec<Money>> = items
            .iter()
            .map(|item| item.unit_price.checked_times(item.quantity))
            .collect();
        let subtotal = lines
            .and_then(Money::checked_sum)
            .filter(|subtotal| subtotal.to_minor_units().is_some())
            .ok_or_else(|| DomainError::validation("Order total is too large"))?;
        if discount.is_negative() || discount > subtotal {
            return Err(DomainError::validation(format!(
                "Discount must be between 0 and {subtotal}"
            )));
        }

        let now = Utc::now();
        let total_amount = subtotal - discount;
        Ok(Self {
            id: OrderId::new(),
            order_number: numbering::order_number(now),
            user_id,
            customer_email,
            items,
            discount,
            total_amount,
            amount_paid: Money::ZERO,
            remaining_balance: total_amount,
            required_payment_type: None,
            required_deposit: None,
            status: OrderStatus::OrderReceived,
            payment_status: PaymentStatus::Pending,
            invoice_id: None,
            shipping_id: None,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        })
    }

    /// Returns Σ quantity × unit price before discount.
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    /// Moves along an edge of the transition table.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.set_status(next);
        Ok(())
    }

    /// Sets the status without consulting the transition table.
    ///
    /// Only invoice creation, design upload, invoice deletion and partial
    /// settlement move an order this way.
    pub(crate) fn set_status(&mut self, next: OrderStatus) {
        self.status = next;
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Checks whether the order may receive a new design.
    ///
    /// The status is checked before the payment policy.
    pub fn check_design_upload(&self) -> Result<(), DomainError> {
        if !self.status.admits_design_upload() {
            return Err(DomainError::invalid_state(format!(
                "Cannot upload a design while the order is {}",
                self.status
            )));
        }
        if self.invoice_id.is_none() {
            return Err(DomainError::PaymentRequired(
                "The order has not been invoiced yet".to_string(),
            ));
        }
        if self.payment_status == PaymentStatus::Completed {
            return Ok(());
        }
        match self.required_payment_type {
            Some(RequiredPaymentType::Part)
                if self.payment_status == PaymentStatus::PartPayment
                    && self.amount_paid >= self.required_deposit.unwrap_or(Money::ZERO) =>
            {
                Ok(())
            }
            Some(RequiredPaymentType::Part) => Err(DomainError::PaymentRequired(format!(
                "A deposit of {} is required before design upload",
                self.required_deposit.unwrap_or(Money::ZERO)
            ))),
            Some(RequiredPaymentType::Full) | None => Err(DomainError::PaymentRequired(
                "Full payment is required before design upload".to_string(),
            )),
        }
    }

    /// Returns true if `remaining_balance = total_amount - amount_paid` and
    /// nothing has been overpaid.
    pub fn ledger_is_consistent(&self) -> bool {
        self.amount_paid <= self.total_amount
            && self.remaining_balance == self.total_amount - self.amount_paid
    }
}

impl Document for Order {
    const KIND: &'static str = "Order";

    fn document_id(&self) -> Uuid {
        self.id.as_uuid()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn lookup(&self) -> BTreeMap<String, String> {
        lookup_fields([
            ("user_id", self.user_id.to_string()),
            ("order_number", self.order_number.clone()),
            ("status", self.status.as_str().to_string()),
            ("payment_status", self.payment_status.as_str().to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_with_total(total: i64) -> Order {
        Order::place(
            UserId::new(),
            "jane@example.com",
            vec![OrderItem::new("mug", "Printed mug", 1, Money::from_major(total))],
            Money::ZERO,
        )
        .unwrap()
    }

    #[test]
    fn place_computes_totals() {
        let order = Order::place(
            UserId::new(),
            "jane@example.com",
            vec![
                OrderItem::new("tee", "T-shirt", 2, Money::from_major(400)),
                OrderItem::new("cap", "Cap", 1, Money::from_major(250)),
            ],
            Money::from_major(50),
        )
        .unwrap();

        assert_eq!(order.subtotal(), Money::from_major(1050));
        assert_eq!(order.total_amount, Money::from_major(1000));
        assert_eq!(order.remaining_balance, Money::from_major(1000));
        assert_eq!(order.status, OrderStatus::OrderReceived);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.order_number.starts_with("ORD-"));
        assert!(order.ledger_is_consistent());
    }

    #[test]
    fn place_rejects_bad_input() {
        let user = UserId::new();
        let item = || OrderItem::new("tee", "T-shirt", 1, Money::from_major(10));

        assert!(Order::place(user, "a@b.c", vec![], Money::ZERO).is_err());
        assert!(Order::place(user, "", vec![item()], Money::ZERO).is_err());
        assert!(
            Order::place(
                user,
                "a@b.c",
                vec![OrderItem::new("tee", "T-shirt", 0, Money::from_major(10))],
                Money::ZERO
            )
            .is_err()
        );
        assert!(
            Order::place(
                user,
                "a@b.c",
                vec![OrderItem::new("tee", "T-shirt", 1, Money::ZERO)],
                Money::ZERO
            )
            .is_err()
        );
        assert!(Order::place(user, "a@b.c", vec![item()], Money::from_major(11)).is_err());
        assert!(Order::place(user, "a@b.c", vec![item()], Money::from_major(-1)).is_err());
    }

    #[test]
    fn place_rejects_totals_that_overflow() {
        let user = UserId::new();
        let huge: Money = "70000000000000000000000000000".parse().unwrap();
        let err = Order::place(
            user,
            "a@b.c",
            vec![OrderItem::new("p", "Poster", 2, huge)],
            Money::ZERO,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // Fits a Decimal but not the gateway's minor units.
        let too_large: Money = "100000000000000000".parse().unwrap();
        assert!(
            Order::place(
                user,
                "a@b.c",
                vec![OrderItem::new("p", "Poster", 1, too_large)],
                Money::ZERO
            )
            .is_err()
        );
    }

    #[test]
    fn transition_follows_table() {
        let mut order = order_with_total(100);
        order.transition_to(OrderStatus::InvoiceSent).unwrap();
        assert_eq!(order.status, OrderStatus::InvoiceSent);

        let err = order.transition_to(OrderStatus::Shipped).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidTransition {
                from: OrderStatus::InvoiceSent,
                to: OrderStatus::Shipped
            }
        ));
        assert_eq!(order.status, OrderStatus::InvoiceSent);
    }

    #[test]
    fn design_gate_requires_invoice_and_payment() {
        let mut order = order_with_total(1000);
        order.status = OrderStatus::Pending;
        assert!(matches!(
            order.check_design_upload(),
            Err(DomainError::InvalidOrderState(_))
        ));

        order.status = OrderStatus::InvoiceSent;
        assert!(matches!(
            order.check_design_upload(),
            Err(DomainError::PaymentRequired(_))
        ));

        order.invoice_id = Some(InvoiceId::new());
        order.required_payment_type = Some(RequiredPaymentType::Full);
        assert!(matches!(
            order.check_design_upload(),
            Err(DomainError::PaymentRequired(_))
        ));

        order.payment_status = PaymentStatus::Completed;
        assert!(order.check_design_upload().is_ok());
    }

    #[test]
    fn design_gate_under_part_payment() {
        let mut order = order_with_total(1000);
        order.status = OrderStatus::PartPaymentMade;
        order.invoice_id = Some(InvoiceId::new());
        order.required_payment_type = Some(RequiredPaymentType::Part);
        order.required_deposit = Some(Money::from_major(300));

        assert!(order.check_design_upload().is_err());

        order.payment_status = PaymentStatus::PartPayment;
        order.amount_paid = Money::from_major(200);
        assert!(order.check_design_upload().is_err());

        order.amount_paid = Money::from_major(300);
        assert!(order.check_design_upload().is_ok());
    }

    #[test]
    fn design_gate_checks_state_before_payment() {
        let mut order = order_with_total(1000);
        order.status = OrderStatus::Cancelled;
        order.invoice_id = Some(InvoiceId::new());
        order.payment_status = PaymentStatus::Completed;
        assert!(matches!(
            order.check_design_upload(),
            Err(DomainError::InvalidOrderState(_))
        ));
    }

    #[test]
    fn lookup_fields_track_status() {
        let order = order_with_total(10);
        let lookup = order.lookup();
        assert_eq!(lookup.get("status").map(String::as_str), Some("OrderReceived"));
        assert_eq!(lookup.get("user_id"), Some(&order.user_id.to_string()));
    }
}
