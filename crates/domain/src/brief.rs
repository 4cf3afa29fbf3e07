//! Order-scoped briefs and feedback.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{Actor, BriefId, OrderId, UserId, UserRole};
use ledger_store::{LedgerStore, Version};
use notifications::{Notification, NotificationEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::document::{Document, UnitOfWork, lookup_fields, query};
use crate::error::DomainError;
use crate::order::{Order, OrderService, ensure_access};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BriefKind {
    Brief,
    Feedback,
}

/// One message in an order's thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    pub id: BriefId,
    pub order_id: OrderId,
    pub kind: BriefKind,
    pub author_id: UserId,
    pub author_role: UserRole,
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<String>,

    /// 1 to 5, feedback only.
    pub rating: Option<u8>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    pub version: Version,
}

impl Document for Brief {
    const KIND: &'static str = "Brief";

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
pub struct NewBrief {
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedback {
    pub message: String,
    pub rating: u8,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl<S: LedgerStore> OrderService<S> {
    /// Adds a brief to the order's thread.
    #[tracing::instrument(skip(self, input))]
    pub async fn post_brief(
        &self,
        actor: &Actor,
        order_id: OrderId,
        input: NewBrief,
    ) -> Result<Brief, DomainError> {
        let order: Order = self.repo.require(order_id.as_uuid()).await?;
        ensure_access(actor, &order)?;

        let brief = self
            .append(actor, &order, BriefKind::Brief, input.message, input.attachments, None)
            .await?;

        let notification = Notification::new(
            NotificationEvent::BriefPosted,
            json!({
                "order_id": order.id,
                "order_number": order.order_number,
                "brief_id": brief.id,
                "author_role": brief.author_role,
            }),
        );
        // Whoever did not write the brief is told about it.
        self.notifier.dispatch(match actor.role {
            UserRole::Customer => notification.to_admins(),
            UserRole::Admin | UserRole::SuperAdmin => notification.to_user(order.user_id),
        });

        Ok(brief)
    }

    /// Records the owner's feedback on a finished order.
    #[tracing::instrument(skip(self, input), fields(rating = input.rating))]
    pub async fn submit_feedback(
        &self,
        actor: &Actor,
        order_id: OrderId,
        input: NewFeedback,
    ) -> Result<Brief, DomainError> {
        let order: Order = self.repo.require(order_id.as_uuid()).await?;
        if actor.user_id != order.user_id {
            return Err(DomainError::unauthorized(
                "Only the order owner can leave feedback",
            ));
        }
        if !order.status.admits_feedback() {
            return Err(DomainError::invalid_state(format!(
                "Feedback is only accepted once the order is completed, it is {}",
                order.status
            )));
        }
        if !(1..=5).contains(&input.rating) {
            return Err(DomainError::validation("Rating must be between 1 and 5"));
        }

        let feedback = self
            .append(
                actor,
                &order,
                BriefKind::Feedback,
                input.message,
                input.attachments,
                Some(input.rating),
            )
            .await?;

        self.notifier.dispatch(
            Notification::new(
                NotificationEvent::FeedbackSubmitted,
                json!({
                    "order_id": order.id,
                    "order_number": order.order_number,
                    "rating": feedback.rating,
                }),
            )
            .to_admins(),
        );

        Ok(feedback)
    }

    /// Lists the order's thread, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_briefs(
        &self,
        actor: &Actor,
        order_id: OrderId,
    ) -> Result<Vec<Brief>, DomainError> {
        let order: Order = self.repo.require(order_id.as_uuid()).await?;
        ensure_access(actor, &order)?;
        self.repo
            .find(query::<Brief>().field("order_id", order_id))
            .await
    }

    async fn append(
        &self,
        actor: &Actor,
        order: &Order,
        kind: BriefKind,
        message: String,
        attachments: Vec<String>,
        rating: Option<u8>,
    ) -> Result<Brief, DomainError> {
        if message.trim().is_empty() {
            return Err(DomainError::validation("A message is required"));
        }

        let now = Utc::now();
        let mut brief = Brief {
            id: BriefId::new(),
            order_id: order.id,
            kind,
            author_id: actor.user_id,
            author_role: actor.role,
            message,
            attachments,
            rating,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        };

        let mut work = UnitOfWork::new();
        work.insert(&brief)?;
        self.repo.commit(work).await?;
        brief.bump_version();
        Ok(brief)
    }
}
