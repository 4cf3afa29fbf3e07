//! Shipping records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{Actor, OrderId, ShippingId, UserId};
use ledger_store::{LedgerStore, Version};
use notifications::{Notification, NotificationEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::document::{Document, UnitOfWork, lookup_fields};
use crate::error::DomainError;
use crate::order::{Order, OrderService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ShippingStatus {
    #[default]
    Created,
}

/// Where and how an order's goods are sent. At most one per order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipping {
    pub id: ShippingId,
    pub order_id: OrderId,
    pub carrier: String,
    pub tracking_number: Option<String>,
    pub address: String,
    pub status: ShippingStatus,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub version: Version,
}

impl Document for Shipping {
    const KIND: &'static str = "Shipping";

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
        lookup_fields([("order_id", self.order_id.to_string())])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippingDetails {
    pub carrier: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
    pub address: String,
}

impl<S: LedgerStore> OrderService<S> {
    /// Creates the shipping record for an order that is ready to ship.
    #[tracing::instrument(skip(self, details))]
    pub async fn create_shipping(
        &self,
        actor: &Actor,
        order_id: OrderId,
        details: ShippingDetails,
    ) -> Result<Shipping, DomainError> {
        if !actor.role.is_admin() {
            return Err(DomainError::unauthorized("Only admins can create shipping"));
        }
        if details.carrier.trim().is_empty() || details.address.trim().is_empty() {
            return Err(DomainError::validation("Carrier and address are required"));
        }

        let mut order: Order = self.repo.require(order_id.as_uuid()).await?;
        if !order.status.admits_shipping() {
            return Err(DomainError::invalid_state(format!(
                "Cannot create shipping while the order is {}",
                order.status
            )));
        }
        if order.shipping_id.is_some() {
            return Err(DomainError::AlreadyExists(format!(
                "Order {} already has a shipping record",
                order.order_number
            )));
        }

        let now = Utc::now();
        let mut shipping = Shipping {
            id: ShippingId::new(),
            order_id,
            carrier: details.carrier,
            tracking_number: details.tracking_number,
            address: details.address,
            status: ShippingStatus::Created,
            created_by: actor.user_id,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        };
        order.shipping_id = Some(shipping.id);
        order.touch();

        let mut work = UnitOfWork::new();
        work.insert(&shipping)?.update(&order)?;
        self.repo.commit(work).await?;
        shipping.bump_version();

        tracing::info!(order_number = %order.order_number, carrier = %shipping.carrier, "Shipping created");
        self.notifier.dispatch(
            Notification::new(
                NotificationEvent::ShippingCreated,
                json!({
                    "order_id": order.id,
                    "order_number": order.order_number,
                    "shipping_id": shipping.id,
                    "carrier": shipping.carrier,
                    "tracking_number": shipping.tracking_number,
                }),
            )
            .to_user(order.user_id)
            .with_email("order_shipped", order.customer_email.clone()),
        );

        Ok(shipping)
    }
}
