//! Order lifecycle state machine.

use serde::{Deserialize, Serialize};

/// The fulfilment status of an order.
///
/// Legal moves are listed by [`OrderStatus::allowed_transitions`]:
/// ```text
/// Pending ──► OrderReceived ──► InvoiceSent ──► AwaitingDeposit ──► DepositPaid
///                  │                                                    │
///                  └──► FilesUploaded                                   ▼
///          UnderReview ◄───────────────────────────────────────── DesignUploaded
///            │    └──► AwaitingPartPayment ──► PartPaymentMade ──┐
///            └──► Approved ─────────────────────────────────────┴──► InProduction
///                                                                        │
///      Delivered ◄── Shipped ◄── FinalPaid ◄── AwaitingFinalPayment ◄── Completed
/// ```
/// Every non-terminal status except `FilesUploaded`, `Completed`, `FinalPaid`
/// and `Shipped` may also move to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    Pending,
    #[default]
    OrderReceived,
    FilesUploaded,
    InvoiceSent,
    AwaitingDeposit,
    DepositPaid,
    DesignUploaded,
    UnderReview,
    Approved,
    AwaitingPartPayment,
    PartPaymentMade,
    InProduction,
    Completed,
    AwaitingFinalPayment,
    FinalPaid,
    ReadyForShipping,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 19] = [
        OrderStatus::Pending,
        OrderStatus::OrderReceived,
        OrderStatus::FilesUploaded,
        OrderStatus::InvoiceSent,
        OrderStatus::AwaitingDeposit,
        OrderStatus::DepositPaid,
        OrderStatus::DesignUploaded,
        OrderStatus::UnderReview,
        OrderStatus::Approved,
        OrderStatus::AwaitingPartPayment,
        OrderStatus::PartPaymentMade,
        OrderStatus::InProduction,
        OrderStatus::Completed,
        OrderStatus::AwaitingFinalPayment,
        OrderStatus::FinalPaid,
        OrderStatus::ReadyForShipping,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Returns the statuses an admin may move an order to from this one.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[OrderReceived, Cancelled],
            OrderReceived => &[FilesUploaded, InvoiceSent, Cancelled],
            InvoiceSent => &[AwaitingDeposit, Cancelled],
            AwaitingDeposit => &[DepositPaid, Cancelled],
            DepositPaid => &[DesignUploaded, Cancelled],
            DesignUploaded => &[UnderReview, Cancelled],
            UnderReview => &[Approved, AwaitingPartPayment, Cancelled],
            Approved => &[InProduction, Cancelled],
            AwaitingPartPayment => &[PartPaymentMade, Cancelled],
            PartPaymentMade => &[InProduction, Cancelled],
            InProduction => &[Completed, Cancelled],
            Completed => &[AwaitingFinalPayment, Shipped, Delivered],
            AwaitingFinalPayment => &[FinalPaid, Cancelled],
            FinalPaid => &[Shipped, Delivered],
            Shipped => &[Delivered],
            FilesUploaded | ReadyForShipping | Delivered | Cancelled => &[],
        }
    }

    /// Returns true if the transition table has an edge to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Returns true if a design may be uploaded while the order is in this status.
    pub fn admits_design_upload(&self) -> bool {
        matches!(
            self,
            OrderStatus::OrderReceived
                | OrderStatus::FilesUploaded
                | OrderStatus::InvoiceSent
                | OrderStatus::AwaitingPartPayment
                | OrderStatus::PartPaymentMade
                | OrderStatus::UnderReview
        )
    }

    /// Returns true if a shipping record may be created in this status.
    pub fn admits_shipping(&self) -> bool {
        matches!(self, OrderStatus::ReadyForShipping | OrderStatus::Completed)
    }

    /// Returns true if the customer may leave feedback in this status.
    pub fn admits_feedback(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Delivered)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::OrderReceived => "OrderReceived",
            OrderStatus::FilesUploaded => "FilesUploaded",
            OrderStatus::InvoiceSent => "InvoiceSent",
            OrderStatus::AwaitingDeposit => "AwaitingDeposit",
            OrderStatus::DepositPaid => "DepositPaid",
            OrderStatus::DesignUploaded => "DesignUploaded",
            OrderStatus::UnderReview => "UnderReview",
            OrderStatus::Approved => "Approved",
            OrderStatus::AwaitingPartPayment => "AwaitingPartPayment",
            OrderStatus::PartPaymentMade => "PartPaymentMade",
            OrderStatus::InProduction => "InProduction",
            OrderStatus::Completed => "Completed",
            OrderStatus::AwaitingFinalPayment => "AwaitingFinalPayment",
            OrderStatus::FinalPaid => "FinalPaid",
            OrderStatus::ReadyForShipping => "ReadyForShipping",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment progress of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    #[default]
    Pending,
    PartPayment,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::PartPayment => "PartPayment",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How an invoiced order must be paid before design work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequiredPaymentType {
    Full,
    Part,
}

impl RequiredPaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredPaymentType::Full => "full",
            RequiredPaymentType::Part => "part",
        }
    }
}

impl std::fmt::Display for RequiredPaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
