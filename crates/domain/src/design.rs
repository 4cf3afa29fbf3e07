//! Design uploads and reviews.
//!
//! Uploading is gated on the order's payment policy; see
//! [`Order::check_design_upload`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{Actor, DesignId, OrderId, UserId};
use ledger_store::{LedgerStore, Version};
use notifications::{Notification, NotificationEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::document::{Document, UnitOfWork, lookup_fields, query};
use crate::error::DomainError;
use crate::order::{Order, OrderService, OrderStatus, ensure_access};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DesignStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl DesignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesignStatus::PendingReview => "PendingReview",
            DesignStatus::Approved => "Approved",
            DesignStatus::Rejected => "Rejected",
        }
    }
}

/// One uploaded design version for an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Design {
    pub id: DesignId,
    pub order_id: OrderId,
    pub product_id: String,
    pub file_url: String,

    /// 1 for the first upload on an order, then max + 1.
    pub design_version: u32,

    pub status: DesignStatus,
    pub review_notes: Option<String>,
    pub reviewed_by: Option<UserId>,
    pub uploaded_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub version: Version,
}

impl Document for Design {
    const KIND: &'static str = "Design";

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
            ("status", self.status.as_str().to_string()),
        ])
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDesign {
    pub product_id: String,
    pub file_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesignDecision {
    Approve,
    Reject,
}

impl<S: LedgerStore> OrderService<S> {
    /// Uploads a new design version and moves the order to `DesignUploaded`.
    #[tracing::instrument(skip(self, input))]
    pub async fn upload_design(
        &self,
        actor: &Actor,
        order_id: OrderId,
        input: NewDesign,
    ) -> Result<Design, DomainError> {
        if !actor.role.is_admin() {
            return Err(DomainError::unauthorized("Only admins can upload designs"));
        }
        if input.file_url.trim().is_empty() {
            return Err(DomainError::validation("A design file URL is required"));
        }

        let mut order: Order = self.repo.require(order_id.as_uuid()).await?;
        order.check_design_upload()?;

        let existing: Vec<Design> = self
            .repo
            .find(query::<Design>().field("order_id", order_id))
            .await?;
        let design_version = existing
            .iter()
            .map(|d| d.design_version)
            .max()
            .unwrap_or(0)
            + 1;

        let now = Utc::now();
        let mut design = Design {
            id: DesignId::new(),
            order_id,
            product_id: input.product_id,
            file_url: input.file_url,
            design_version,
            status: DesignStatus::PendingReview,
            review_notes: None,
            reviewed_by: None,
            uploaded_by: actor.user_id,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        };

        let previous = order.status;
        order.set_status(OrderStatus::DesignUploaded);

        let mut work = UnitOfWork::new();
        work.insert(&design)?.update(&order)?;
        self.repo.commit(work).await?;
        design.bump_version();

        tracing::info!(
            order_number = %order.order_number,
            design_version,
            "Design uploaded"
        );
        self.notify_status_change(&order, previous);
        self.notifier.dispatch(
            Notification::new(
                NotificationEvent::DesignUploaded,
                json!({
                    "order_id": order.id,
                    "order_number": order.order_number,
                    "design_id": design.id,
                    "design_version": design.design_version,
                    "file_url": design.file_url,
                }),
            )
            .to_user(order.user_id)
            .with_email("design_uploaded", order.customer_email.clone()),
        );

        Ok(design)
    }

    /// Lists an order's designs by version.
    #[tracing::instrument(skip(self))]
    pub async fn list_designs(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<Vec<Design>, DomainError> {
        let order: Order = self.repo.require(order_id.as_uuid()).await?;
        ensure_access(actor, &order)?;

        let mut designs: Vec<Design> = self
            .repo
            .find(query::<Design>().field("order_id", order_id))
            .await?;
        designs.sort_by_key(|d| d.design_version);
        Ok(designs)
    }

    /// Approves or rejects a design that is awaiting review.
    ///
    /// Approval walks the order through `UnderReview` to `Approved`; a
    /// rejection leaves it `UnderReview` for the next upload.
    #[tracing::instrument(skip(self, notes))]
    pub async fn review_design(
        &self,
        actor: &Actor,
        design_id: DesignId,
        decision: DesignDecision,
        notes: Option<String>,
    ) -> Result<Design, DomainError> {
        let mut design: Design = self.repo.require(design_id.as_uuid()).await?;
        let mut order: Order = self.repo.require(design.order_id.as_uuid()).await?;
        ensure_access(actor, &order)?;

        if design.status != DesignStatus::PendingReview {
            return Err(DomainError::invalid_state(format!(
                "Design version {} has already been reviewed",
                design.design_version
            )));
        }

        let previous = order.status;
        if order.status != OrderStatus::UnderReview {
            order.transition_to(OrderStatus::UnderReview)?;
        }
        design.status = match decision {
            DesignDecision::Approve => {
                order.transition_to(OrderStatus::Approved)?;
                DesignStatus::Approved
            }
            DesignDecision::Reject => DesignStatus::Rejected,
        };
        design.review_notes = notes;
        design.reviewed_by = Some(actor.user_id);
        design.updated_at = Utc::now();

        let mut work = UnitOfWork::new();
        work.update(&design)?.update(&order)?;
        self.repo.commit(work).await?;
        design.bump_version();

        tracing::info!(
            order_number = %order.order_number,
            design_version = design.design_version,
            status = design.status.as_str(),
            "Design reviewed"
        );
        if order.status != previous {
            self.notify_status_change(&order, previous);
        }
        self.notifier.dispatch(
            Notification::new(
                NotificationEvent::DesignReviewed,
                json!({
                    "order_id": order.id,
                    "design_id": design.id,
                    "design_version": design.design_version,
                    "status": design.status,
                    "notes": design.review_notes,
                }),
            )
            .to_user(order.user_id)
            .to_admins(),
        );

        Ok(design)
    }
}
