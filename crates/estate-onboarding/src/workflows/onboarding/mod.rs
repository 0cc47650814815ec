//! Staged verification workflow for investors and sponsors.
//!
//! Subjects pass two hard gates (identity, then profile) before the soft investor and
//! sponsor stages. Every stage decision is computed from a freshly fetched
//! [`VerificationSnapshot`]; admin decisions flow through the review protocol and are
//! committed together with their comment and notification.

pub mod domain;
pub mod gate;
pub mod guards;
pub mod listings;
pub mod orchestrator;
pub mod providers;
pub mod review;
pub mod router;
pub mod service;
pub mod snapshot;
pub mod status;
pub mod store;

#[cfg(test)]
mod tests;

pub use domain::{
    Answer, FieldError, KybSubmission, Listing, ListingDraft, ListingId, Notification,
    ProfileFields, QuestionnaireSubmission, ReviewComment, SponsorProfilePatch, SubjectId,
};
pub use gate::{compute_stage, Capabilities, OnboardingStage, StageDecision};
pub use guards::{AccessGuard, GuardRedirect, GuardedAction};
pub use orchestrator::{
    IdentityResume, KybRequest, OnboardingOrchestrator, ProfileError, ProfileSubmission,
    QuestionnaireRequest, StageView, SubmitIntent, UsernameAvailability, UsernamePolicy,
};
pub use providers::{
    AuthProvider, IdentityCheck, IdentityOutcome, IdentitySession, IdentityVerificationProvider,
    NotificationSink, Principal, ProviderError,
};
pub use review::{ReviewCommand, ReviewError, ReviewRequest};
pub use router::onboarding_router;
pub use service::{Collaborators, OnboardingError, OnboardingService};
pub use snapshot::VerificationSnapshot;
pub use status::{
    EntityStatus, EntityType, IdentityStatus, ListingStatus, SubmissionStatus, TransitionError,
};
pub use store::{InMemorySubmissionStore, StoreError, SubmissionStore, UpsertOutcome};
