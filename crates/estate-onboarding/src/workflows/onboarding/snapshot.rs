use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    InvestorQuestionnaire, Listing, ListingId, ProfileFields, SponsorProfile, SubjectId,
    VerificationSubject,
};
use super::gate::OnboardingStage;
use super::status::{EntityType, IdentityStatus, ListingStatus};

/// Point-in-time view of everything the gate needs to know about one subject.
///
/// Always fetched fresh from the store at the start of a request; never cached across
/// navigations. `revision` increments on every write to the subject's records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSnapshot {
    pub subject_id: SubjectId,
    pub revision: u64,
    pub identity_status: IdentityStatus,
    pub profile: ProfileFields,
    pub profile_complete: bool,
    pub sponsor_skipped: bool,
    pub questionnaire: Option<InvestorQuestionnaire>,
    pub sponsor: Option<SponsorProfile>,
    pub listings: Vec<ListingSummary>,
    pub feedback: Vec<FeedbackNote>,
    /// Deep-link stage carried in from the request's query string.
    #[serde(skip)]
    pub requested_stage: Option<OnboardingStage>,
}

impl VerificationSnapshot {
    /// Snapshot for a subject that has authenticated but has no verification records yet.
    pub fn fresh(subject: &VerificationSubject) -> Self {
        Self {
            subject_id: subject.id.clone(),
            revision: 0,
            identity_status: IdentityStatus::NotStarted,
            profile: subject.profile.clone(),
            profile_complete: subject.profile_complete(),
            sponsor_skipped: subject.sponsor_skipped_at.is_some(),
            questionnaire: None,
            sponsor: None,
            listings: Vec::new(),
            feedback: Vec::new(),
            requested_stage: None,
        }
    }

    pub fn with_requested_stage(mut self, stage: Option<OnboardingStage>) -> Self {
        self.requested_stage = stage;
        self
    }

    pub fn has_username(&self) -> bool {
        self.profile.username.is_provided()
    }

    /// Most recent subject-visible comment left on an entity type.
    pub fn latest_feedback(&self, entity: EntityType) -> Option<&FeedbackNote> {
        self.feedback
            .iter()
            .filter(|note| note.entity_type == entity)
            .max_by_key(|note| note.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSummary {
    pub id: ListingId,
    pub title: String,
    pub status: ListingStatus,
    pub updated_at: DateTime<Utc>,
}

impl From<&Listing> for ListingSummary {
    fn from(listing: &Listing) -> Self {
        Self {
            id: listing.id.clone(),
            title: listing.details.title.clone(),
            status: listing.status,
            updated_at: listing.updated_at,
        }
    }
}

/// External review comment surfaced alongside a blocking status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackNote {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
