//! Domain layer of the order ledger.
//!
//! This crate provides:
//! - [`Order`], [`Invoice`] and [`Transaction`] documents kept in a
//!   [`ledger_store::LedgerStore`]
//! - the order status machine and the guards on design upload and shipping
//! - the pure ledger rules in [`ledger`] that derive payment and invoice
//!   statuses from amounts
//! - [`OrderService`] and [`InvoiceService`]

pub mod brief;
pub mod design;
pub mod document;
pub mod error;
pub mod invoice;
pub mod ledger;
pub mod money;
pub mod numbering;
pub mod order;
pub mod page;
pub mod shipping;
pub mod transaction;

pub use brief::{Brief, BriefKind, NewBrief, NewFeedback};
pub use design::{Design, DesignDecision, DesignStatus, NewDesign};
pub use document::{Document, Repository, UnitOfWork, query};
pub use error::DomainError;
pub use invoice::{Invoice, InvoiceItem, InvoiceService, InvoiceStatus, InvoiceType, NewInvoice};
pub use money::Money;
pub use order::{
    NewOrder, Order, OrderFilter, OrderItem, OrderService, OrderStatus, PaymentStatus,
    RequiredPaymentType,
};
pub use page::{Page, PageRequest};
pub use shipping::{Shipping, ShippingDetails, ShippingStatus};
pub use transaction::{PaymentMethod, Transaction, TransactionStatus, TransactionType};
