use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::{Listing, ListingDraft, ListingId, SubjectId};
use super::guards::AccessGuard;
use super::service::OnboardingError;
use super::status::{EntityType, ListingStatus, Transition, TransitionError};
use super::store::SubmissionStore;

/// Sponsor-side listing lifecycle. Admin-side moves go through the review desk.
pub struct ListingDesk<S> {
    store: Arc<S>,
}

/// Who besides the owner may perform an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Authors {
    OwnerOnly,
    OwnerAndVotingMembers,
}

impl<S> ListingDesk<S>
where
    S: SubmissionStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create a DRAFT owned by the actor, who must hold a verified sponsor profile now.
    pub fn create(
        &self,
        actor: &SubjectId,
        draft: ListingDraft,
        now: DateTime<Utc>,
    ) -> Result<Listing, OnboardingError> {
        let snapshot = self.store.snapshot(actor)?;
        AccessGuard::SponsorVerified.check(Some(&snapshot))?;

        let details = draft.validate()?;
        let listing = self.store.insert_listing(actor, details, now)?;
        info!(owner = %actor, listing = %listing.id, "listing drafted");
        Ok(listing)
    }

    /// Owner or co-author view of one listing.
    pub fn get(&self, actor: &SubjectId, id: &ListingId) -> Result<Listing, OnboardingError> {
        let listing = self.fetch(id)?;
        self.authorize(actor, &listing, Authors::OwnerAndVotingMembers)?;
        Ok(listing)
    }

    /// DRAFT to PENDING_REVIEW.
    pub fn submit(
        &self,
        actor: &SubjectId,
        id: &ListingId,
        now: DateTime<Utc>,
    ) -> Result<Listing, OnboardingError> {
        self.move_for_review(actor, id, &[ListingStatus::Draft], now)
    }

    /// REJECTED or WITHDRAWN back to PENDING_REVIEW.
    pub fn resubmit(
        &self,
        actor: &SubjectId,
        id: &ListingId,
        now: DateTime<Utc>,
    ) -> Result<Listing, OnboardingError> {
        self.move_for_review(actor, id, &ListingStatus::RESUBMITTABLE, now)
    }

    pub fn withdraw(
        &self,
        actor: &SubjectId,
        id: &ListingId,
        now: DateTime<Utc>,
    ) -> Result<Listing, OnboardingError> {
        let listing = self.fetch(id)?;
        self.authorize(actor, &listing, Authors::OwnerOnly)?;
        require_from(listing.status, &ListingStatus::WITHDRAWABLE, "WITHDRAWN")?;
        let next = ListingStatus::check(listing.status, ListingStatus::Withdrawn)?;

        let updated = self.store.set_listing_status(id, listing.status, next, now)?;
        info!(listing = %id, from = %listing.status, "listing withdrawn");
        Ok(updated)
    }

    pub fn delete(&self, actor: &SubjectId, id: &ListingId) -> Result<(), OnboardingError> {
        let listing = self.fetch(id)?;
        self.authorize(actor, &listing, Authors::OwnerOnly)?;
        require_from(listing.status, &ListingStatus::DELETABLE, "DELETED")?;

        self.store.remove_listing(id, listing.status)?;
        info!(listing = %id, from = %listing.status, "listing deleted");
        Ok(())
    }

    fn move_for_review(
        &self,
        actor: &SubjectId,
        id: &ListingId,
        allowed: &[ListingStatus],
        now: DateTime<Utc>,
    ) -> Result<Listing, OnboardingError> {
        let listing = self.fetch(id)?;
        self.authorize(actor, &listing, Authors::OwnerAndVotingMembers)?;

        // Authoring rights are re-checked against the owner's current sponsor status.
        let owner = self.store.snapshot(&listing.owner)?;
        AccessGuard::SponsorVerified.check(Some(&owner))?;

        require_from(listing.status, allowed, "PENDING_REVIEW")?;
        let next = ListingStatus::check(listing.status, ListingStatus::PendingReview)?;

        let updated = self.store.set_listing_status(id, listing.status, next, now)?;
        info!(%actor, listing = %id, from = %listing.status, "listing sent for review");
        Ok(updated)
    }

    fn fetch(&self, id: &ListingId) -> Result<Listing, OnboardingError> {
        self.store.listing(id)?.ok_or(OnboardingError::NotFound)
    }

    fn authorize(
        &self,
        actor: &SubjectId,
        listing: &Listing,
        authors: Authors,
    ) -> Result<(), OnboardingError> {
        if &listing.owner == actor {
            return Ok(());
        }
        if authors == Authors::OwnerAndVotingMembers {
            let owner = self.store.snapshot(&listing.owner)?;
            if owner
                .sponsor
                .as_ref()
                .is_some_and(|sponsor| sponsor.is_co_author(actor))
            {
                return Ok(());
            }
        }
        Err(OnboardingError::NotOwner {
            subject: actor.clone(),
            entity: EntityType::Listing,
            entity_id: listing.id.to_string(),
        })
    }
}

fn require_from(
    current: ListingStatus,
    allowed: &[ListingStatus],
    requested: &str,
) -> Result<(), TransitionError> {
    if allowed.contains(&current) {
        Ok(())
    } else {
        Err(TransitionError::InvalidTransition {
            entity: EntityType::Listing,
            current: current.to_string(),
            requested: requested.to_string(),
        })
    }
}
