//! Pure payment ledger rules.
//!
//! Statuses are always derived from the ledger amounts; nothing caches an
//! "is paid" flag separately.

use chrono::{DateTime, Utc};
use common::TransactionId;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::DomainError;
use crate::invoice::{Invoice, InvoiceStatus};
use crate::money::Money;
use crate::order::{Order, OrderStatus, PaymentStatus, RequiredPaymentType};
use crate::transaction::{Transaction, TransactionStatus, TransactionType};

/// Deposit share of the invoice total when none is given explicitly.
pub const DEFAULT_DEPOSIT_PERCENT: Decimal = dec!(30);

/// Derives an invoice's status from its amounts.
///
/// `Draft` and `Sent` are kept until money arrives.
pub fn invoice_status(amount_paid: Money, total: Money, current: InvoiceStatus) -> InvoiceStatus {
    if amount_paid >= total {
        InvoiceStatus::Paid
    } else if amount_paid.is_positive() {
        InvoiceStatus::PartiallyPaid
    } else {
        current
    }
}

/// Derives an order's payment status from its remaining balance and the
/// type of the payment that was just applied.
pub fn order_payment_status(
    remaining: Money,
    last_type: Option<TransactionType>,
) -> PaymentStatus {
    if !remaining.is_positive() {
        PaymentStatus::Completed
    } else if last_type.is_some_and(|t| t.is_partial()) {
        PaymentStatus::PartPayment
    } else {
        PaymentStatus::Pending
    }
}

/// Returns what is still owed on an invoice.
///
/// Before any payment a part-payment invoice advertises the balance that will
/// be left after the deposit; from the first payment on it is
/// `total - amount_paid`.
pub fn invoice_remaining(
    total: Money,
    amount_paid: Money,
    payment_type: RequiredPaymentType,
    deposit: Money,
) -> Money {
    if amount_paid.is_zero() && payment_type == RequiredPaymentType::Part {
        (total - deposit).non_negative()
    } else {
        (total - amount_paid).non_negative()
    }
}

/// Returns the deposit for a part-payment invoice.
pub fn deposit_for(total: Money, requested: Option<Money>, percent: Decimal) -> Money {
    requested.unwrap_or_else(|| total.percentage(percent))
}

/// Returns the exact amount a new payment of `transaction_type` must carry.
pub fn expected_payment(
    invoice: &Invoice,
    transaction_type: TransactionType,
) -> Result<Money, DomainError> {
    match transaction_type {
        TransactionType::Final => Ok((invoice.total_amount - invoice.amount_paid).non_negative()),
        TransactionType::Deposit | TransactionType::Part => {
            if invoice.payment_type != RequiredPaymentType::Part
                || !invoice.deposit_amount.is_positive()
            {
                return Err(DomainError::validation(format!(
                    "Invoice {} does not take a deposit",
                    invoice.invoice_number
                )));
            }
            if invoice.amount_paid >= invoice.deposit_amount {
                return Err(DomainError::validation(format!(
                    "The deposit on invoice {} has already been paid",
                    invoice.invoice_number
                )));
            }
            Ok(invoice.deposit_amount)
        }
        TransactionType::Refund => Err(DomainError::validation(
            "Refunds cannot be initiated as payments",
        )),
    }
}

/// Validates the amount of a payment about to be initiated.
pub fn validate_payment_amount(
    invoice: &Invoice,
    transaction_type: TransactionType,
    amount: Money,
) -> Result<(), DomainError> {
    if !amount.is_positive() {
        return Err(DomainError::validation("Payment amount must be positive"));
    }
    if invoice.status == InvoiceStatus::Paid {
        return Err(DomainError::validation(format!(
            "Invoice {} is already paid",
            invoice.invoice_number
        )));
    }

    let expected = expected_payment(invoice, transaction_type)?;
    if amount != expected {
        return Err(DomainError::AmountMismatch {
            expected,
            actual: amount,
        });
    }
    Ok(())
}

/// Applies one confirmed payment to both ledgers.
///
/// Paid amounts are clamped to the totals. A partial payment moves the order
/// to `PartPaymentMade`; a payment that clears the balance only follows the
/// edge recording it when the order is waiting for one.
pub fn apply_settled_payment(
    order: &mut Order,
    invoice: &mut Invoice,
    amount: Money,
    transaction_type: TransactionType,
    transaction_id: TransactionId,
    at: DateTime<Utc>,
) {
    order.amount_paid = (order.amount_paid + amount).min(order.total_amount);
    order.remaining_balance = (order.total_amount - order.amount_paid).non_negative();
    order.payment_status = order_payment_status(order.remaining_balance, Some(transaction_type));

    match order.payment_status {
        PaymentStatus::PartPayment => order.status = OrderStatus::PartPaymentMade,
        PaymentStatus::Completed => {
            if let Some(next) = payment_recorded_edge(order.status) {
                order.status = next;
            }
        }
        _ => {}
    }
    if order.invoice_id.is_none() {
        order.invoice_id = Some(invoice.id);
    }
    order.updated_at = at;

    invoice.transactions.push(transaction_id);
    invoice.amount_paid = (invoice.amount_paid + amount).min(invoice.total_amount);
    invoice.remaining_amount = (invoice.total_amount - invoice.amount_paid).non_negative();
    invoice.status = invoice_status(invoice.amount_paid, invoice.total_amount, invoice.status);
    if invoice.status == InvoiceStatus::Paid && invoice.paid_at.is_none() {
        invoice.paid_at = Some(at);
    }
    invoice.updated_at = at;
}

/// Returns the status that records a payment the order was waiting for.
fn payment_recorded_edge(status: OrderStatus) -> Option<OrderStatus> {
    match status {
        OrderStatus::AwaitingDeposit => Some(OrderStatus::DepositPaid),
        OrderStatus::AwaitingPartPayment => Some(OrderStatus::PartPaymentMade),
        OrderStatus::AwaitingFinalPayment => Some(OrderStatus::FinalPaid),
        _ => None,
    }
}

/// Rebuilds both ledgers from the invoice's completed transactions.
///
/// Returns true if any stored amount, status or transaction link differed
/// from the recomputed value. Order statuses are never moved by a replay.
pub fn replay_settlements(
    order: &mut Order,
    invoice: &mut Invoice,
    transactions: &[Transaction],
    at: DateTime<Utc>,
) -> bool {
    let mut completed: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| tx.status == TransactionStatus::Completed && tx.invoice_id == invoice.id)
        .collect();
    completed.sort_by_key(|tx| (tx.paid_at, tx.created_at));

    let settled: Money = completed.iter().map(|tx| tx.amount).sum();
    let last_type = completed.last().map(|tx| tx.transaction_type);
    let ids: Vec<TransactionId> = completed.iter().map(|tx| tx.id).collect();

    let invoice_paid = settled.min(invoice.total_amount);
    let baseline = match invoice.status {
        InvoiceStatus::PartiallyPaid | InvoiceStatus::Paid => InvoiceStatus::Sent,
        other => other,
    };
    let invoice_status = invoice_status(invoice_paid, invoice.total_amount, baseline);
    let invoice_remaining = invoice_remaining(
        invoice.total_amount,
        invoice_paid,
        invoice.payment_type,
        invoice.deposit_amount,
    );

    let order_paid = settled.min(order.total_amount);
    let order_remaining = (order.total_amount - order_paid).non_negative();
    // A completed order keeps the payment status it was closed with.
    let payment_status = if order.payment_status == PaymentStatus::Completed
        && matches!(
            order.status,
            OrderStatus::Completed | OrderStatus::Shipped | OrderStatus::Delivered
        ) {
        PaymentStatus::Completed
    } else {
        order_payment_status(order_remaining, last_type)
    };

    let drift = invoice.amount_paid != invoice_paid
        || invoice.remaining_amount != invoice_remaining
        || invoice.status != invoice_status
        || invoice.transactions != ids
        || order.amount_paid != order_paid
        || order.remaining_balance != order_remaining
        || order.payment_status != payment_status;
    if !drift {
        return false;
    }

    invoice.amount_paid = invoice_paid;
    invoice.remaining_amount = invoice_remaining;
    invoice.status = invoice_status;
    invoice.transactions = ids;
    invoice.paid_at = match invoice_status {
        InvoiceStatus::Paid => invoice
            .paid_at
            .or_else(|| completed.last().and_then(|tx| tx.paid_at))
            .or(Some(at)),
        _ => None,
    };
    invoice.updated_at = at;

    order.amount_paid = order_paid;
    order.remaining_balance = order_remaining;
    order.payment_status = payment_status;
    order.updated_at = at;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::test_support::{invoice_for_total, invoiced_order};
    use crate::transaction::PaymentMethod;

    #[test]
    fn invoice_status_derivation() {
        let total = Money::from_major(1000);
        assert_eq!(
            invoice_status(Money::ZERO, total, InvoiceStatus::Draft),
            InvoiceStatus::Draft
        );
        assert_eq!(
            invoice_status(Money::ZERO, total, InvoiceStatus::Sent),
            InvoiceStatus::Sent
        );
        assert_eq!(
            invoice_status(Money::from_major(300), total, InvoiceStatus::Draft),
            InvoiceStatus::PartiallyPaid
        );
        assert_eq!(
            invoice_status(total, total, InvoiceStatus::PartiallyPaid),
            InvoiceStatus::Paid
        );
    }

    #[test]
    fn order_payment_status_derivation() {
        assert_eq!(
            order_payment_status(Money::ZERO, Some(TransactionType::Final)),
            PaymentStatus::Completed
        );
        assert_eq!(
            order_payment_status(Money::from_major(700), Some(TransactionType::Part)),
            PaymentStatus::PartPayment
        );
        assert_eq!(
            order_payment_status(Money::from_major(700), Some(TransactionType::Deposit)),
            PaymentStatus::PartPayment
        );
        assert_eq!(
            order_payment_status(Money::from_major(700), Some(TransactionType::Final)),
            PaymentStatus::Pending
        );
        assert_eq!(order_payment_status(Money::from_major(1), None), PaymentStatus::Pending);
    }

    #[test]
    fn remaining_before_and_after_first_payment() {
        let total = Money::from_major(1000);
        let deposit = Money::from_major(300);
        assert_eq!(
            invoice_remaining(total, Money::ZERO, RequiredPaymentType::Part, deposit),
            Money::from_major(700)
        );
        assert_eq!(
            invoice_remaining(total, deposit, RequiredPaymentType::Part, deposit),
            Money::from_major(700)
        );
        assert_eq!(
            invoice_remaining(total, Money::ZERO, RequiredPaymentType::Full, Money::ZERO),
            total
        );
        assert_eq!(
            invoice_remaining(total, total, RequiredPaymentType::Part, deposit),
            Money::ZERO
        );
    }

    #[test]
    fn default_deposit_is_thirty_percent() {
        assert_eq!(
            deposit_for(Money::from_major(1000), None, DEFAULT_DEPOSIT_PERCENT),
            Money::from_major(300)
        );
        assert_eq!(
            deposit_for(Money::from_major(1000), Some(Money::from_major(450)), DEFAULT_DEPOSIT_PERCENT),
            Money::from_major(450)
        );
    }

    #[test]
    fn final_must_match_total_on_fresh_invoice() {
        let invoice = invoice_for_total(1000, RequiredPaymentType::Full, 0);
        assert!(validate_payment_amount(&invoice, TransactionType::Final, Money::from_major(1000)).is_ok());
        assert!(matches!(
            validate_payment_amount(&invoice, TransactionType::Final, Money::from_major(999)),
            Err(DomainError::AmountMismatch { .. })
        ));
    }

    #[test]
    fn final_after_deposit_must_match_outstanding_balance() {
        let mut invoice = invoice_for_total(1000, RequiredPaymentType::Part, 300);
        invoice.amount_paid = Money::from_major(300);
        assert!(validate_payment_amount(&invoice, TransactionType::Final, Money::from_major(700)).is_ok());
        assert!(validate_payment_amount(&invoice, TransactionType::Final, Money::from_major(1000)).is_err());
    }

    #[test]
    fn part_must_match_deposit() {
        let invoice = invoice_for_total(1000, RequiredPaymentType::Part, 300);
        assert!(validate_payment_amount(&invoice, TransactionType::Part, Money::from_major(300)).is_ok());
        assert!(matches!(
            validate_payment_amount(&invoice, TransactionType::Deposit, Money::from_major(500)),
            Err(DomainError::AmountMismatch { expected, .. }) if expected == Money::from_major(300)
        ));

        let full = invoice_for_total(1000, RequiredPaymentType::Full, 0);
        assert!(matches!(
            validate_payment_amount(&full, TransactionType::Part, Money::from_major(300)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn rejects_non_positive_refund_and_paid_invoice() {
        let mut invoice = invoice_for_total(1000, RequiredPaymentType::Full, 0);
        assert!(matches!(
            validate_payment_amount(&invoice, TransactionType::Final, Money::ZERO),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            validate_payment_amount(&invoice, TransactionType::Refund, Money::from_major(10)),
            Err(DomainError::Validation(_))
        ));

        invoice.status = InvoiceStatus::Paid;
        assert!(matches!(
            validate_payment_amount(&invoice, TransactionType::Final, Money::from_major(1000)),
            Err(DomainError::Validation(_))
        ));
    }

    fn completed(invoice: &Invoice, amount: i64, transaction_type: TransactionType) -> Transaction {
        let mut tx = Transaction::pending(
            invoice.order_id,
            invoice.id,
            invoice.user_id,
            crate::numbering::payment_reference(Utc::now()),
            Money::from_major(amount),
            transaction_type,
            PaymentMethod::Paystack,
            invoice.user_id,
        );
        tx.complete(Utc::now());
        tx
    }

    #[test]
    fn deposit_then_final_settlement() {
        let (mut order, mut invoice) = invoiced_order(1000, RequiredPaymentType::Part, 300);
        assert_eq!(invoice.remaining_amount, Money::from_major(700));

        let deposit = completed(&invoice, 300, TransactionType::Part);
        apply_settled_payment(
            &mut order,
            &mut invoice,
            deposit.amount,
            deposit.transaction_type,
            deposit.id,
            Utc::now(),
        );
        assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.remaining_amount, Money::from_major(700));
        assert_eq!(order.payment_status, PaymentStatus::PartPayment);
        assert_eq!(order.status, OrderStatus::PartPaymentMade);
        assert_eq!(order.remaining_balance, Money::from_major(700));
        assert!(order.ledger_is_consistent());

        let last = completed(&invoice, 700, TransactionType::Final);
        apply_settled_payment(
            &mut order,
            &mut invoice,
            last.amount,
            last.transaction_type,
            last.id,
            Utc::now(),
        );
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert!(invoice.paid_at.is_some());
        assert_eq!(invoice.remaining_amount, Money::ZERO);
        assert_eq!(invoice.transactions, vec![deposit.id, last.id]);
        assert_eq!(order.payment_status, PaymentStatus::Completed);
        assert_eq!(order.status, OrderStatus::PartPaymentMade);
        assert!(order.ledger_is_consistent());
    }

    #[test]
    fn full_payment_records_awaited_edge_only() {
        let (mut order, mut invoice) = invoiced_order(500, RequiredPaymentType::Full, 0);
        order.status = OrderStatus::AwaitingFinalPayment;
        apply_settled_payment(
            &mut order,
            &mut invoice,
            Money::from_major(500),
            TransactionType::Final,
            TransactionId::new(),
            Utc::now(),
        );
        assert_eq!(order.status, OrderStatus::FinalPaid);

        let (mut order, mut invoice) = invoiced_order(500, RequiredPaymentType::Full, 0);
        apply_settled_payment(
            &mut order,
            &mut invoice,
            Money::from_major(500),
            TransactionType::Final,
            TransactionId::new(),
            Utc::now(),
        );
        assert_eq!(order.status, OrderStatus::InvoiceSent);
        assert_eq!(order.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn overpayment_is_clamped() {
        let (mut order, mut invoice) = invoiced_order(100, RequiredPaymentType::Full, 0);
        apply_settled_payment(
            &mut order,
            &mut invoice,
            Money::from_major(150),
            TransactionType::Final,
            TransactionId::new(),
            Utc::now(),
        );
        assert_eq!(order.amount_paid, Money::from_major(100));
        assert_eq!(invoice.amount_paid, Money::from_major(100));
        assert_eq!(order.remaining_balance, Money::ZERO);
    }

    #[test]
    fn replay_repairs_drift() {
        let (mut order, mut invoice) = invoiced_order(1000, RequiredPaymentType::Part, 300);
        let deposit = completed(&invoice, 300, TransactionType::Deposit);

        // Only the transaction was written.
        assert!(replay_settlements(&mut order, &mut invoice, &[deposit.clone()], Utc::now()));
        assert_eq!(invoice.amount_paid, Money::from_major(300));
        assert_eq!(invoice.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(invoice.transactions, vec![deposit.id]);
        assert_eq!(order.amount_paid, Money::from_major(300));
        assert_eq!(order.payment_status, PaymentStatus::PartPayment);

        assert!(!replay_settlements(&mut order, &mut invoice, &[deposit], Utc::now()));
    }

    #[test]
    fn replay_ignores_unsettled_transactions() {
        let (mut order, mut invoice) = invoiced_order(1000, RequiredPaymentType::Full, 0);
        let mut failed = completed(&invoice, 1000, TransactionType::Final);
        failed.status = TransactionStatus::Failed;

        assert!(!replay_settlements(&mut order, &mut invoice, &[failed], Utc::now()));
        assert_eq!(invoice.amount_paid, Money::ZERO);
        assert_eq!(invoice.status, InvoiceStatus::Draft);
    }
}
