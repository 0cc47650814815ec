use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::config::OnboardingConfig;

use super::domain::{
    comment_content, AuthorRole, FieldError, InvestorQuestionnaire, Listing, ListingDraft,
    ListingId, ReviewComment, SponsorProfile, SponsorProfilePatch, SubjectId,
};
use super::gate::{Capabilities, OnboardingStage};
use super::guards::{AccessGuard, GuardRedirect, GuardedAction};
use super::listings::ListingDesk;
use super::orchestrator::{
    IdentityResume, IdentitySessionView, KybRequest, OnboardingOrchestrator, ProfileError,
    ProfileSubmission, QuestionnaireRequest, StageView, SubmissionView, UsernamePolicy,
};
use super::providers::{
    AuthProvider, IdentityVerificationProvider, NotificationSink, Principal, ProviderError,
};
use super::review::{ReviewDesk, ReviewError, ReviewRequest};
use super::status::{EntityType, TransitionError};
use super::store::{NewComment, ReviewReceipt, StoreError, SubmissionStore, SubmissionSummary};

/// External collaborators wired into the service.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityVerificationProvider>,
    pub notifications: Arc<dyn NotificationSink>,
    pub auth: Arc<dyn AuthProvider>,
}

/// Facade composing the orchestrator, review desk, and listing desk behind one principal-aware
/// API for the router.
pub struct OnboardingService<S> {
    store: Arc<S>,
    auth: Arc<dyn AuthProvider>,
    orchestrator: OnboardingOrchestrator<S>,
    review: ReviewDesk<S>,
    listings: ListingDesk<S>,
}

/// Answer of the capability check endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityCheck {
    pub allowed: bool,
    pub capabilities: Capabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<GuardRedirect>,
}

impl<S> OnboardingService<S>
where
    S: SubmissionStore + 'static,
{
    pub fn new(store: Arc<S>, collaborators: Collaborators, config: &OnboardingConfig) -> Self {
        let orchestrator = OnboardingOrchestrator::new(
            store.clone(),
            collaborators.identity,
            UsernamePolicy::from_config(config),
        );
        let review = ReviewDesk::new(store.clone(), collaborators.notifications);
        let listings = ListingDesk::new(store.clone());

        Self {
            store,
            auth: collaborators.auth,
            orchestrator,
            review,
            listings,
        }
    }

    pub fn orchestrator(&self) -> &OnboardingOrchestrator<S> {
        &self.orchestrator
    }

    pub fn review_desk(&self) -> &ReviewDesk<S> {
        &self.review
    }

    /// Resolve the bearer token and make sure the subject has a record.
    pub fn authenticate(&self, bearer_token: Option<&str>) -> Result<Principal, OnboardingError> {
        let principal = bearer_token
            .and_then(|token| self.auth.authenticate(token))
            .ok_or(OnboardingError::Unauthenticated)?;
        self.store.ensure_subject(&principal.subject_id, Utc::now())?;
        Ok(principal)
    }

    pub fn status(
        &self,
        principal: &Principal,
        stage: Option<&str>,
    ) -> Result<StageView, OnboardingError> {
        let requested = stage
            .filter(|value| !value.trim().is_empty())
            .map(|value| {
                value.parse::<OnboardingStage>().map_err(|error| FieldError::Invalid {
                    field: "stage",
                    reason: error.to_string(),
                })
            })
            .transpose()?;
        self.orchestrator.enter(&principal.subject_id, requested)
    }

    pub fn start_identity_session(
        &self,
        principal: &Principal,
    ) -> Result<IdentitySessionView, OnboardingError> {
        self.orchestrator.start_identity_check(&principal.subject_id, Utc::now())
    }

    pub fn resume_identity(
        &self,
        principal: &Principal,
        resume: IdentityResume,
    ) -> Result<StageView, OnboardingError> {
        self.orchestrator.resume_after_identity_check(&principal.subject_id, resume, Utc::now())
    }

    pub fn reset_identity(&self, principal: &Principal) -> Result<StageView, OnboardingError> {
        self.orchestrator.reset_identity(&principal.subject_id, Utc::now())
    }

    pub fn check_username(
        &self,
        principal: &Principal,
        username: &str,
    ) -> Result<bool, OnboardingError> {
        self.orchestrator.check_username(&principal.subject_id, username)
    }

    pub fn submit_profile(
        &self,
        principal: &Principal,
        submission: ProfileSubmission,
    ) -> Result<StageView, OnboardingError> {
        self.orchestrator.submit_profile(&principal.subject_id, submission, Utc::now())
    }

    pub fn submit_questionnaire(
        &self,
        principal: &Principal,
        request: QuestionnaireRequest,
    ) -> Result<SubmissionView<InvestorQuestionnaire>, OnboardingError> {
        self.orchestrator.submit_questionnaire(&principal.subject_id, request, Utc::now())
    }

    pub fn submit_sponsor_kyb(
        &self,
        principal: &Principal,
        request: KybRequest,
    ) -> Result<SubmissionView<SponsorProfile>, OnboardingError> {
        self.orchestrator.submit_sponsor_kyb(&principal.subject_id, request, Utc::now())
    }

    pub fn update_sponsor_profile(
        &self,
        principal: &Principal,
        patch: SponsorProfilePatch,
    ) -> Result<SponsorProfile, OnboardingError> {
        self.orchestrator.update_sponsor_profile(&principal.subject_id, patch, Utc::now())
    }

    /// Run the guard for an action against a snapshot fetched now.
    pub fn check_capability(
        &self,
        principal: &Principal,
        action: GuardedAction,
    ) -> Result<CapabilityCheck, OnboardingError> {
        let view = self.orchestrator.enter(&principal.subject_id, None)?;
        let capabilities = view.decision.capabilities;
        let outcome = match action.guard().check(Some(&view.snapshot)) {
            Ok(()) if action == GuardedAction::Invest && !capabilities.can_invest => {
                let stage = OnboardingStage::InvestorProfile;
                Err(GuardRedirect {
                    guard: AccessGuard::IdentityApproved,
                    stage: Some(stage),
                    redirect: stage.deep_link(),
                })
            }
            other => other,
        };
        Ok(CapabilityCheck {
            allowed: outcome.is_ok(),
            capabilities,
            redirect: outcome.err(),
        })
    }

    /// Subject-visible thread for an entity the principal owns.
    pub fn comments(
        &self,
        principal: &Principal,
        entity: EntityType,
        entity_id: &str,
    ) -> Result<Vec<ReviewComment>, OnboardingError> {
        self.require_owner(principal, entity, entity_id)?;
        Ok(self.store.comments(entity, entity_id, false)?)
    }

    pub fn reply(
        &self,
        principal: &Principal,
        entity: EntityType,
        entity_id: &str,
        content: &str,
    ) -> Result<ReviewComment, OnboardingError> {
        self.require_owner(principal, entity, entity_id)?;
        let content = comment_content(content)?;
        let comment = self.store.append_comment(
            NewComment {
                entity_type: entity,
                entity_id: entity_id.to_string(),
                subject_id: principal.subject_id.clone(),
                author: principal.subject_id.clone(),
                author_role: AuthorRole::Subject,
                content,
                internal: false,
            },
            Utc::now(),
        )?;
        Ok(comment)
    }

    /// Remove the principal's account and everything it owns.
    pub fn delete_account(&self, principal: &Principal) -> Result<(), OnboardingError> {
        self.store.delete_subject(&principal.subject_id)?;
        info!(subject = %principal.subject_id, "account deleted");
        Ok(())
    }

    pub fn create_listing(
        &self,
        principal: &Principal,
        draft: ListingDraft,
    ) -> Result<Listing, OnboardingError> {
        self.listings.create(&principal.subject_id, draft, Utc::now())
    }

    pub fn listing(
        &self,
        principal: &Principal,
        id: &ListingId,
    ) -> Result<Listing, OnboardingError> {
        self.listings.get(&principal.subject_id, id)
    }

    pub fn submit_listing(
        &self,
        principal: &Principal,
        id: &ListingId,
    ) -> Result<Listing, OnboardingError> {
        self.listings.submit(&principal.subject_id, id, Utc::now())
    }

    pub fn resubmit_listing(
        &self,
        principal: &Principal,
        id: &ListingId,
    ) -> Result<Listing, OnboardingError> {
        self.listings.resubmit(&principal.subject_id, id, Utc::now())
    }

    pub fn withdraw_listing(
        &self,
        principal: &Principal,
        id: &ListingId,
    ) -> Result<Listing, OnboardingError> {
        self.listings.withdraw(&principal.subject_id, id, Utc::now())
    }

    pub fn delete_listing(
        &self,
        principal: &Principal,
        id: &ListingId,
    ) -> Result<(), OnboardingError> {
        self.listings.delete(&principal.subject_id, id)
    }

    pub fn review(
        &self,
        principal: &Principal,
        entity: EntityType,
        entity_id: &str,
        request: &ReviewRequest,
    ) -> Result<ReviewReceipt, OnboardingError> {
        require_admin(principal)?;
        self.review.review(&principal.subject_id, entity, entity_id, request, Utc::now())
    }

    pub fn review_queue(
        &self,
        principal: &Principal,
        include_finalized: bool,
    ) -> Result<Vec<SubmissionSummary>, OnboardingError> {
        require_admin(principal)?;
        self.review.queue(include_finalized)
    }

    pub fn admin_comments(
        &self,
        principal: &Principal,
        entity: EntityType,
        entity_id: &str,
    ) -> Result<Vec<ReviewComment>, OnboardingError> {
        require_admin(principal)?;
        self.review.comments(entity, entity_id)
    }

    pub fn admin_note(
        &self,
        principal: &Principal,
        entity: EntityType,
        entity_id: &str,
        content: &str,
        internal: bool,
    ) -> Result<ReviewComment, OnboardingError> {
        require_admin(principal)?;
        self.review.add_note(
            &principal.subject_id,
            entity,
            entity_id,
            content,
            internal,
            Utc::now(),
        )
    }

    fn require_owner(
        &self,
        principal: &Principal,
        entity: EntityType,
        entity_id: &str,
    ) -> Result<(), OnboardingError> {
        let target = self.store.review_target(entity, entity_id)?;
        if target.subject_id == principal.subject_id {
            Ok(())
        } else {
            Err(OnboardingError::NotOwner {
                subject: principal.subject_id.clone(),
                entity,
                entity_id: entity_id.to_string(),
            })
        }
    }
}

fn require_admin(principal: &Principal) -> Result<(), OnboardingError> {
    if principal.admin {
        Ok(())
    } else {
        Err(OnboardingError::Forbidden)
    }
}

/// Error raised by the onboarding workflow.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(StoreError),
    /// The snapshot a write was based on has moved on; re-fetch and recompute.
    #[error("stale snapshot: {0}")]
    StaleSnapshot(String),
    #[error("access denied: {0}")]
    AccessDenied(GuardRedirect),
    #[error("{subject} may not act on {entity} {entity_id}")]
    NotOwner {
        subject: SubjectId,
        entity: EntityType,
        entity_id: String,
    },
    #[error("record not found")]
    NotFound,
    #[error("authentication required")]
    Unauthenticated,
    #[error("admin role required")]
    Forbidden,
}

impl From<GuardRedirect> for OnboardingError {
    fn from(redirect: GuardRedirect) -> Self {
        OnboardingError::AccessDenied(redirect)
    }
}

impl From<StoreError> for OnboardingError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound => OnboardingError::NotFound,
            StoreError::UsernameTaken(username) => {
                OnboardingError::Profile(ProfileError::UsernameTaken(username))
            }
            StoreError::Transition(error) => OnboardingError::Transition(error),
            StoreError::ForeignSession(session_id) => {
                OnboardingError::Field(FieldError::Invalid {
                    field: "session_id",
                    reason: format!("{session_id} is not the open identity session"),
                })
            }
            error @ (StoreError::StaleRevision { .. } | StoreError::StatusChanged { .. }) => {
                OnboardingError::StaleSnapshot(error.to_string())
            }
            other => OnboardingError::Store(other),
        }
    }
}
