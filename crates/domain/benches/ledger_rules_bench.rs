use chrono::{Duration, Utc};
use common::{Actor, InvoiceId, TransactionId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::ledger::{self, DEFAULT_DEPOSIT_PERCENT};
use domain::{
    Invoice, InvoiceService, InvoiceStatus, InvoiceType, Money, NewInvoice, NewOrder, Order,
    OrderItem, OrderService, OrderStatus, RequiredPaymentType, TransactionType,
};
use ledger_store::{InMemoryLedgerStore, Version};
use notifications::NotificationDispatcher;

fn invoiced(total: i64) -> (Order, Invoice) {
    let total = Money::from_major(total);
    let mut order = Order::place(
        UserId::new(),
        "bench@example.com",
        vec![OrderItem::new("poster", "Poster", 1, total)],
        Money::ZERO,
    )
    .unwrap();
    let deposit = ledger::deposit_for(total, None, DEFAULT_DEPOSIT_PERCENT);
    let now = Utc::now();
    let invoice = Invoice {
        id: InvoiceId::new(),
        order_id: order.id,
        user_id: order.user_id,
        invoice_number: domain::numbering::invoice_number(now),
        invoice_type: InvoiceType::Main,
        items: Invoice::lines_for(&order),
        subtotal: total,
        discount: Money::ZERO,
        total_amount: total,
        payment_type: RequiredPaymentType::Part,
        deposit_amount: deposit,
        amount_paid: Money::ZERO,
        remaining_amount: total - deposit,
        status: InvoiceStatus::Draft,
        due_date: now + Duration::days(7),
        paid_at: None,
        transactions: Vec::new(),
        created_by: order.user_id,
        created_at: now,
        updated_at: now,
        version: Version::initial(),
    };
    order.invoice_id = Some(invoice.id);
    order.required_payment_type = Some(RequiredPaymentType::Part);
    order.required_deposit = Some(deposit);
    (order, invoice)
}

fn bench_transition_table(c: &mut Criterion) {
    c.bench_function("ledger/transition_table_closure", |b| {
        b.iter(|| {
            OrderStatus::ALL
                .iter()
                .flat_map(|from| OrderStatus::ALL.iter().map(move |to| from.can_transition_to(*to)))
                .filter(|allowed| *allowed)
                .count()
        });
    });
}

fn bench_settlement(c: &mut Criterion) {
    let (order, invoice) = invoiced(1000);

    c.bench_function("ledger/apply_deposit_then_final", |b| {
        b.iter(|| {
            let mut order = order.clone();
            let mut invoice = invoice.clone();
            ledger::apply_settled_payment(
                &mut order,
                &mut invoice,
                Money::from_major(300),
                TransactionType::Part,
                TransactionId::new(),
                Utc::now(),
            );
            ledger::apply_settled_payment(
                &mut order,
                &mut invoice,
                Money::from_major(700),
                TransactionType::Final,
                TransactionId::new(),
                Utc::now(),
            );
            invoice.status
        });
    });

    c.bench_function("ledger/validate_payment_amount", |b| {
        b.iter(|| {
            ledger::validate_payment_amount(&invoice, TransactionType::Part, Money::from_major(300))
                .is_ok()
        });
    });
}

fn bench_create_invoice(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryLedgerStore::new();
    let orders = OrderService::new(store.clone(), NotificationDispatcher::noop());
    let invoices = InvoiceService::new(store, NotificationDispatcher::noop());
    let admin = Actor::admin(UserId::new());

    c.bench_function("ledger/create_order_and_invoice", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = orders
                    .create_order(
                        &admin,
                        NewOrder {
                            user_id: Some(UserId::new()),
                            customer_email: "bench@example.com".to_string(),
                            items: vec![OrderItem::new("mug", "Mug", 4, Money::from_major(250))],
                            discount: None,
                        },
                    )
                    .await
                    .unwrap();
                invoices
                    .create_invoice(&admin, order.id, NewInvoice::part())
                    .await
                    .unwrap()
            })
        });
    });
}

criterion_group!(
    benches,
    bench_transition_table,
    bench_settlement,
    bench_create_invoice
);
criterion_main!(benches);
