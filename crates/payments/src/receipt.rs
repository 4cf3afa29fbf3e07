//! Marker for an invoice's pending bank-transfer receipt.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{InvoiceId, TransactionId};
use domain::Document;
use ledger_store::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Held while a bank-transfer receipt awaits verification.
///
/// Keyed by the invoice id, so a second receipt for the same invoice fails
/// the insert instead of racing past a lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptClaim {
    pub invoice_id: InvoiceId,
    pub transaction_id: TransactionId,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub version: Version,
}

impl ReceiptClaim {
    pub fn new(invoice_id: InvoiceId, transaction_id: TransactionId) -> Self {
        Self {
            invoice_id,
            transaction_id,
            created_at: Utc::now(),
            version: Version::initial(),
        }
    }
}

impl Document for ReceiptClaim {
    const KIND: &'static str = "ReceiptClaim";

    fn document_id(&self) -> Uuid {
        self.invoice_id.as_uuid()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn lookup(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("transaction_id".to_string(), self.transaction_id.to_string())])
    }
}
