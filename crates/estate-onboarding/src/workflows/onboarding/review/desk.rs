use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::super::domain::{comment_content, AuthorRole, Notification, ReviewComment, SubjectId};
use super::super::providers::NotificationSink;
use super::super::service::OnboardingError;
use super::super::status::EntityType;
use super::super::store::{
    NewComment, ReviewCommit, ReviewReceipt, SubmissionStore, SubmissionSummary,
};
use super::actions::{plan_review, ReviewCommand};
use super::ReviewRequest;

/// Applies admin decisions to submissions and relays the resulting notifications.
pub struct ReviewDesk<S> {
    store: Arc<S>,
    notifications: Arc<dyn NotificationSink>,
}

impl<S> ReviewDesk<S>
where
    S: SubmissionStore + 'static,
{
    pub fn new(store: Arc<S>, notifications: Arc<dyn NotificationSink>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Validate and commit one review action. Nothing is written unless every check passes.
    pub fn review(
        &self,
        reviewer: &SubjectId,
        entity: EntityType,
        entity_id: &str,
        request: &ReviewRequest,
        now: DateTime<Utc>,
    ) -> Result<ReviewReceipt, OnboardingError> {
        let command =
            ReviewCommand::parse(entity, &request.action, request.new_status.as_deref())?;
        let target = self.store.review_target(entity, entity_id)?;
        let plan = plan_review(command, target.status, request.comment.as_deref())?;

        let (title, message) = plan.notice(&target.title);
        let comment = plan.comment.clone().map(|content| NewComment {
            entity_type: entity,
            entity_id: entity_id.to_string(),
            subject_id: target.subject_id.clone(),
            author: reviewer.clone(),
            author_role: AuthorRole::Admin,
            content,
            internal: false,
        });
        let notification = Notification {
            subject_id: target.subject_id.clone(),
            title,
            message,
            link: Some(plan.link(entity_id)),
            created_at: now,
        };

        let receipt = self.store.commit_review(ReviewCommit {
            target,
            next: plan.next,
            comment,
            notification,
            at: now,
        })?;

        info!(
            %reviewer,
            %entity,
            entity_id,
            action = command.label(),
            from = %plan.current,
            to = %plan.next,
            "review committed"
        );
        self.flush_notifications();
        Ok(receipt)
    }

    /// Deliver queued notifications. Delivery failures are logged and dropped; the review
    /// they describe stays committed.
    pub fn flush_notifications(&self) -> usize {
        let pending = match self.store.drain_notifications() {
            Ok(pending) => pending,
            Err(error) => {
                warn!(%error, "unable to drain notification outbox");
                return 0;
            }
        };

        let mut delivered = 0;
        for notification in &pending {
            match self.notifications.notify(notification) {
                Ok(()) => delivered += 1,
                Err(error) => warn!(
                    subject = %notification.subject_id,
                    title = %notification.title,
                    %error,
                    "notification delivery failed"
                ),
            }
        }
        delivered
    }

    pub fn queue(
        &self,
        include_finalized: bool,
    ) -> Result<Vec<SubmissionSummary>, OnboardingError> {
        Ok(self.store.review_queue(include_finalized)?)
    }

    /// Full thread for an entity, internal notes included.
    pub fn comments(
        &self,
        entity: EntityType,
        entity_id: &str,
    ) -> Result<Vec<ReviewComment>, OnboardingError> {
        self.store.review_target(entity, entity_id)?;
        Ok(self.store.comments(entity, entity_id, true)?)
    }

    /// Comment outside of a status change, typically an internal note.
    pub fn add_note(
        &self,
        reviewer: &SubjectId,
        entity: EntityType,
        entity_id: &str,
        content: &str,
        internal: bool,
        now: DateTime<Utc>,
    ) -> Result<ReviewComment, OnboardingError> {
        let target = self.store.review_target(entity, entity_id)?;
        let content = comment_content(content)?;
        let comment = self.store.append_comment(
            NewComment {
                entity_type: entity,
                entity_id: entity_id.to_string(),
                subject_id: target.subject_id,
                author: reviewer.clone(),
                author_role: AuthorRole::Admin,
                content,
                internal,
            },
            now,
        )?;
        Ok(comment)
    }
}
