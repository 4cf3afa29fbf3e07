//! Invoice document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{InvoiceId, OrderId, TransactionId, UserId};
use ledger_store::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{Document, lookup_fields};
use crate::money::Money;
use crate::order::{Order, RequiredPaymentType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InvoiceStatus {
    #[default]
    Draft,
    Sent,
    PartiallyPaid,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "Draft",
            InvoiceStatus::Sent => "Sent",
            InvoiceStatus::PartiallyPaid => "PartiallyPaid",
            InvoiceStatus::Paid => "Paid",
            InvoiceStatus::Overdue => "Overdue",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InvoiceType {
    #[default]
    Main,
    Shipping,
}

/// A billable line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total: Money,
}

/// Billing document derived from an order.
///
/// Tracks what is owed and paid independently of the order's own ledger
/// fields; reconciliation keeps the two in step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub order_id: OrderId,

    /// Owner of the invoiced order.
    pub user_id: UserId,

    pub invoice_number: String,
    pub invoice_type: InvoiceType,
    pub items: Vec<InvoiceItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub total_amount: Money,
    pub payment_type: RequiredPaymentType,
    pub deposit_amount: Money,
    pub amount_paid: Money,
    pub remaining_amount: Money,
    pub status: InvoiceStatus,
    pub due_date: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,

    /// Settled transactions, in settlement order.
    #[serde(default)]
    pub transactions: Vec<TransactionId>,

    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub version: Version,
}

impl Invoice {
    /// Builds invoice lines from the order's items.
    pub fn lines_for(order: &Order) -> Vec<InvoiceItem> {
        order
            .items
            .iter()
            .map(|item| InvoiceItem {
                description: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                total: item.line_total(),
            })
            .collect()
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }

    /// Marks the invoice as written without changing its ledger.
    ///
    /// Committed alongside every new payment attempt, so a deletion that
    /// loaded the invoice earlier fails on its version.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Document for Invoice {
    const KIND: &'static str = "Invoice";

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
            ("order_id", self.order_id.to_string()),
            ("user_id", self.user_id.to_string()),
            ("invoice_number", self.invoice_number.clone()),
            ("status", self.status.as_str().to_string()),
        ])
    }
}
