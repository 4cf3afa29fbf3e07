//! Order lifecycle operations.

use common::{Actor, OrderId, UserId};
use ledger_store::LedgerStore;
use notifications::{Notification, NotificationDispatcher, NotificationEvent};
use serde::Deserialize;
use serde_json::json;

use crate::document::{Document, Repository, UnitOfWork, query};
use crate::error::DomainError;
use crate::money::Money;
use crate::page::{Page, PageRequest};

use super::{Order, OrderItem, OrderStatus, PaymentStatus};

/// Input for [`OrderService::create_order`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    /// Owner of the order. Admins may order on behalf of any user; a customer
    /// always orders for themselves.
    #[serde(default)]
    pub user_id: Option<UserId>,

    pub customer_email: String,

    pub items: Vec<OrderItem>,

    #[serde(default)]
    pub discount: Option<Money>,
}

/// Filters for [`OrderService::list_orders`].
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub user_id: Option<UserId>,
    pub page: PageRequest,
}

/// Service for managing orders.
///
/// Applies status transitions and the guards on actions that depend on an
/// order's payment state. Design, shipping and brief operations live next to
/// their documents.
#[derive(Clone)]
pub struct OrderService<S: LedgerStore> {
    pub(crate) repo: Repository<S>,
    pub(crate) notifier: NotificationDispatcher,
}

impl<S: LedgerStore> OrderService<S> {
    /// Creates a new order service over the given store.
    pub fn new(store: S, notifier: NotificationDispatcher) -> Self {
        Self {
            repo: Repository::new(store),
            notifier,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &Repository<S> {
        &self.repo
    }

    /// Places a new order in `OrderReceived`.
    #[tracing::instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn create_order(&self, actor: &Actor, input: NewOrder) -> Result<Order, DomainError> {
        let user_id = match (actor.role.is_admin(), input.user_id) {
            (true, Some(user_id)) => user_id,
            (true, None) => actor.user_id,
            (false, Some(user_id)) if user_id != actor.user_id => {
                return Err(DomainError::unauthorized(
                    "Customers can only place orders for themselves",
                ));
            }
            (false, _) => actor.user_id,
        };

        let mut order = Order::place(
            user_id,
            input.customer_email,
            input.items,
            input.discount.unwrap_or(Money::ZERO),
        )?;

        let mut work = UnitOfWork::new();
        work.insert(&order)?;
        self.repo.commit(work).await?;
        order.bump_version();

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_number = %order.order_number,
            total = %order.total_amount,
            "Order created"
        );

        self.notifier.dispatch(
            Notification::new(
                NotificationEvent::OrderCreated,
                json!({
                    "order_id": order.id,
                    "order_number": order.order_number,
                    "user_id": order.user_id,
                    "total_amount": order.total_amount,
                }),
            )
            .to_admins()
            .with_email("order_confirmation", order.customer_email.clone()),
        );

        Ok(order)
    }

    /// Loads an order visible to the actor.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, actor: &Actor, order_id: OrderId) -> Result<Order, DomainError> {
        let order: Order = self.repo.require(order_id.as_uuid()).await?;
        ensure_access(actor, &order)?;
        Ok(order)
    }

    /// Lists orders, newest first.
    ///
    /// Customers only ever see their own orders.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(
        &self,
        actor: &Actor,
        filter: OrderFilter,
    ) -> Result<Page<Order>, DomainError> {
        let owner = if actor.role.is_admin() {
            filter.user_id
        } else {
            Some(actor.user_id)
        };

        let mut q = query::<Order>().newest_first();
        if let Some(owner) = owner {
            q = q.field("user_id", owner);
        }
        if let Some(status) = filter.status {
            q = q.field("status", status.as_str());
        }
        if let Some(payment_status) = filter.payment_status {
            q = q.field("payment_status", payment_status.as_str());
        }

        let total = self.repo.count(q.without_pagination()).await?;
        let items = self
            .repo
            .find(q.offset(filter.page.offset()).limit(filter.page.per_page))
            .await?;

        Ok(Page {
            items,
            total,
            page: filter.page.page,
            per_page: filter.page.per_page,
        })
    }

    /// Moves an order along an edge of the transition table.
    ///
    /// Moving to `Completed` also closes the order's payment status.
    #[tracing::instrument(skip(self))]
    pub async fn transition_status(
        &self,
        actor: &Actor,
        order_id: OrderId,
        requested: OrderStatus,
    ) -> Result<Order, DomainError> {
        if !actor.role.is_admin() {
            return Err(DomainError::unauthorized("Only admins can change order status"));
        }

        let mut order: Order = self.repo.require(order_id.as_uuid()).await?;
        let previous = order.status;
        order.transition_to(requested)?;
        if requested == OrderStatus::Completed {
            order.payment_status = PaymentStatus::Completed;
        }

        let mut work = UnitOfWork::new();
        work.update(&order)?;
        self.repo.commit(work).await?;
        order.bump_version();

        metrics::counter!(
            "status_transitions_total",
            "from" => previous.as_str(),
            "to" => requested.as_str()
        )
        .increment(1);
        tracing::info!(
            order_number = %order.order_number,
            from = %previous,
            to = %requested,
            "Order status changed"
        );

        self.notify_status_change(&order, previous);
        if requested == OrderStatus::Completed {
            self.notifier.dispatch(
                Notification::new(
                    NotificationEvent::OrderDelivered,
                    json!({
                        "order_id": order.id,
                        "order_number": order.order_number,
                    }),
                )
                .to_user(order.user_id)
                .with_email("order_delivered", order.customer_email.clone()),
            );
        }

        Ok(order)
    }

    /// Checks whether a design may be uploaded for the order.
    pub async fn can_upload_design(&self, order_id: OrderId) -> Result<(), DomainError> {
        let order: Order = self.repo.require(order_id.as_uuid()).await?;
        order.check_design_upload()
    }

    pub(crate) fn notify_status_change(&self, order: &Order, previous: OrderStatus) {
        self.notifier.dispatch(
            Notification::new(
                NotificationEvent::OrderStatusChanged,
                json!({
                    "order_id": order.id,
                    "order_number": order.order_number,
                    "from": previous,
                    "to": order.status,
                }),
            )
            .to_user(order.user_id),
        );
    }
}

/// Fails unless the actor owns the order or is an admin.
pub(crate) fn ensure_access(actor: &Actor, order: &Order) -> Result<(), DomainError> {
    if actor.can_access(order.user_id) {
        Ok(())
    } else {
        Err(DomainError::unauthorized("You cannot access this order"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_store::InMemoryLedgerStore;
    use notifications::{RecordingEmailSender, RecordingNotificationPort};
    use std::sync::Arc;

    fn new_order(user_id: Option<UserId>) -> NewOrder {
        NewOrder {
            user_id,
            customer_email: "jane@example.com".to_string(),
            items: vec![
                OrderItem::new("tee", "T-shirt", 2, Money::from_major(400)),
                OrderItem::new("mug", "Mug", 1, Money::from_major(200)),
            ],
            discount: None,
        }
    }

    fn service() -> OrderService<InMemoryLedgerStore> {
        OrderService::new(InMemoryLedgerStore::new(), NotificationDispatcher::noop())
    }

    #[tokio::test]
    async fn test_create_order() {
        let service = service();
        let customer = Actor::customer(UserId::new());

        let order = service.create_order(&customer, new_order(None)).await.unwrap();

        assert_eq!(order.user_id, customer.user_id);
        assert_eq!(order.total_amount, Money::from_major(1000));
        assert_eq!(order.status, OrderStatus::OrderReceived);
        assert_eq!(order.version, ledger_store::Version::first());
    }

    #[tokio::test]
    async fn test_customer_cannot_order_for_someone_else() {
        let service = service();
        let customer = Actor::customer(UserId::new());

        let err = service
            .create_order(&customer, new_order(Some(UserId::new())))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));

        let admin = Actor::admin(UserId::new());
        let owner = UserId::new();
        let order = service.create_order(&admin, new_order(Some(owner))).await.unwrap();
        assert_eq!(order.user_id, owner);
    }

    #[tokio::test]
    async fn test_get_order_checks_ownership() {
        let service = service();
        let customer = Actor::customer(UserId::new());
        let order = service.create_order(&customer, new_order(None)).await.unwrap();

        assert!(service.get_order(&customer, order.id).await.is_ok());
        assert!(service.get_order(&Actor::admin(UserId::new()), order.id).await.is_ok());

        let err = service
            .get_order(&Actor::customer(UserId::new()), order.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));

        let err = service.get_order(&customer, OrderId::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_orders_scopes_and_paginates() {
        let service = service();
        let alice = Actor::customer(UserId::new());
        let bob = Actor::customer(UserId::new());
        for _ in 0..3 {
            service.create_order(&alice, new_order(None)).await.unwrap();
        }
        let latest = service.create_order(&alice, new_order(None)).await.unwrap();
        service.create_order(&bob, new_order(None)).await.unwrap();

        let page = service
            .list_orders(
                &alice,
                OrderFilter {
                    page: PageRequest::new(1, 2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, latest.id);
        assert!(page.items.iter().all(|o| o.user_id == alice.user_id));

        let all = service
            .list_orders(&Actor::admin(UserId::new()), OrderFilter::default())
            .await
            .unwrap();
        assert_eq!(all.total, 5);

        let received = service
            .list_orders(
                &Actor::admin(UserId::new()),
                OrderFilter {
                    status: Some(OrderStatus::OrderReceived),
                    user_id: Some(bob.user_id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(received.total, 1);
    }

    #[tokio::test]
    async fn test_transition_requires_admin_and_table_edge() {
        let service = service();
        let customer = Actor::customer(UserId::new());
        let admin = Actor::admin(UserId::new());
        let order = service.create_order(&customer, new_order(None)).await.unwrap();

        let err = service
            .transition_status(&customer, order.id, OrderStatus::Cancelled)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Unauthorized(_)));

        let err = service
            .transition_status(&admin, order.id, OrderStatus::Shipped)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));

        let cancelled = service
            .transition_status(&admin, order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.version, ledger_store::Version::new(2));
    }

    #[tokio::test]
    async fn test_completed_closes_payment_and_notifies_owner() {
        let port = RecordingNotificationPort::new();
        let email = RecordingEmailSender::new();
        let notifier =
            NotificationDispatcher::new(Arc::new(port.clone()), Arc::new(email.clone()), "admins");
        let service = OrderService::new(InMemoryLedgerStore::new(), notifier.clone());
        let admin = Actor::admin(UserId::new());

        let mut order = service
            .create_order(&Actor::customer(UserId::new()), new_order(None))
            .await
            .unwrap();
        order.set_status(OrderStatus::InProduction);
        let mut work = UnitOfWork::new();
        work.update(&order).unwrap();
        service.repository().commit(work).await.unwrap();

        let order = service
            .transition_status(&admin, order.id, OrderStatus::Completed)
            .await
            .unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Completed);

        notifier.wait_idle().await;
        let room = order.user_id.to_string();
        let delivered = port.messages_for("order_delivered").await;
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].room, room);
        let changed = port.messages_for("order_status_changed").await;
        assert_eq!(changed[0].payload["to"], "Completed");
        assert!(
            email
                .sent()
                .await
                .iter()
                .any(|e| e.template == "order_delivered" && e.recipient == "jane@example.com")
        );
    }

    #[tokio::test]
    async fn test_can_upload_design_before_invoice() {
        let service = service();
        let order = service
            .create_order(&Actor::customer(UserId::new()), new_order(None))
            .await
            .unwrap();
        let err = service.can_upload_design(order.id).await.unwrap_err();
        assert!(matches!(err, DomainError::PaymentRequired(_)));
    }
}
