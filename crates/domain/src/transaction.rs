//! Payment transaction records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{InvoiceId, OrderId, TransactionId, UserId};
use ledger_store::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::{Document, lookup_fields};
use crate::error::DomainError;
use crate::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "Pending",
            TransactionStatus::Completed => "Completed",
            TransactionStatus::Failed => "Failed",
            TransactionStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a payment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    Deposit,
    Part,
    Final,
    Refund,
}

impl TransactionType {
    /// Returns true for payments that only cover the deposit portion.
    pub fn is_partial(&self) -> bool {
        matches!(self, TransactionType::Deposit | TransactionType::Part)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "Deposit",
            TransactionType::Part => "Part",
            TransactionType::Final => "Final",
            TransactionType::Refund => "Refund",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    Paystack,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Paystack => "Paystack",
            PaymentMethod::BankTransfer => "BankTransfer",
        }
    }
}

/// One payment attempt against an invoice.
///
/// Created `Pending` and settled at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub order_id: OrderId,
    pub invoice_id: InvoiceId,

    /// Owner of the order being paid for.
    pub user_id: UserId,

    pub reference: String,
    pub amount: Money,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    pub payment_method: PaymentMethod,

    /// Gateway payload, receipt URL and verification notes.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    pub paid_at: Option<DateTime<Utc>>,
    pub initiated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub version: Version,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        order_id: OrderId,
        invoice_id: InvoiceId,
        user_id: UserId,
        reference: String,
        amount: Money,
        transaction_type: TransactionType,
        payment_method: PaymentMethod,
        initiated_by: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            order_id,
            invoice_id,
            user_id,
            reference,
            amount,
            status: TransactionStatus::Pending,
            transaction_type,
            payment_method,
            metadata: serde_json::Map::new(),
            paid_at: None,
            initiated_by,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Fails with `AlreadyProcessed` unless the transaction is still pending.
    pub fn ensure_pending(&self) -> Result<(), DomainError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(DomainError::AlreadyProcessed {
                reference: self.reference.clone(),
            })
        }
    }

    /// Marks the transaction completed.
    pub fn complete(&mut self, at: DateTime<Utc>) {
        self.status = TransactionStatus::Completed;
        self.paid_at = Some(at);
        self.updated_at = at;
    }

    /// Marks the transaction failed.
    pub fn fail(&mut self, at: DateTime<Utc>) {
        self.status = TransactionStatus::Failed;
        self.updated_at = at;
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }
}

impl Document for Transaction {
    const KIND: &'static str = "Transaction";

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
            ("reference", self.reference.clone()),
            ("order_id", self.order_id.to_string()),
            ("invoice_id", self.invoice_id.to_string()),
            ("status", self.status.as_str().to_string()),
            ("payment_method", self.payment_method.as_str().to_string()),
        ])
    }
}
