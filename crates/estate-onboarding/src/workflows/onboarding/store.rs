use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    Answer, AuthorRole, IdentityVerification, InvestorQuestionnaire, KybDetails, Listing,
    ListingDetails, ListingId, Notification, ProfileFields, QuestionnaireAnswers, ReviewComment,
    SponsorPresentation, SponsorProfile, SponsorProfilePatch, SubjectId, SubmissionId,
    VerificationSubject,
};
use super::snapshot::{FeedbackNote, ListingSummary, VerificationSnapshot};
use super::status::{
    check_submission, EntityStatus, EntityType, IdentityStatus, ListingStatus, SubmissionStatus,
    Transition, TransitionError,
};

/// Persistence boundary for verification records.
///
/// Every method is one atomic unit: implementations must apply the whole change or none
/// of it, and must not interleave two writes for the same subject and stage.
pub trait SubmissionStore: Send + Sync {
    /// Create the subject on first authentication; returns the existing record otherwise.
    fn ensure_subject(
        &self,
        subject: &SubjectId,
        now: DateTime<Utc>,
    ) -> Result<VerificationSubject, StoreError>;

    fn snapshot(&self, subject: &SubjectId) -> Result<VerificationSnapshot, StoreError>;

    /// Case-insensitive; a subject's own username counts as available to them.
    fn username_available(&self, username: &str, requester: &SubjectId)
        -> Result<bool, StoreError>;

    /// Replace profile fields, claiming the username in the same step.
    fn update_profile(
        &self,
        subject: &SubjectId,
        profile: ProfileFields,
        expected_revision: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<VerificationSubject, StoreError>;

    fn advance_identity(
        &self,
        subject: &SubjectId,
        update: IdentityUpdate,
        now: DateTime<Utc>,
    ) -> Result<IdentityVerification, StoreError>;

    /// Create or resubmit the questionnaire. `skip_sponsor` records the finish-now choice in
    /// the same write.
    fn upsert_questionnaire(
        &self,
        subject: &SubjectId,
        answers: QuestionnaireAnswers,
        skip_sponsor: bool,
        expected_revision: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<(InvestorQuestionnaire, UpsertOutcome), StoreError>;

    fn upsert_sponsor(
        &self,
        subject: &SubjectId,
        details: KybDetails,
        presentation: SponsorPresentation,
        expected_revision: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<(SponsorProfile, UpsertOutcome), StoreError>;

    fn patch_sponsor(
        &self,
        subject: &SubjectId,
        patch: SponsorProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<SponsorProfile, StoreError>;

    fn insert_listing(
        &self,
        sponsor: &SubjectId,
        details: ListingDetails,
        now: DateTime<Utc>,
    ) -> Result<Listing, StoreError>;

    fn listing(&self, id: &ListingId) -> Result<Option<Listing>, StoreError>;

    /// Compare-and-set the listing status; no transition table is consulted here.
    fn set_listing_status(
        &self,
        id: &ListingId,
        expected: ListingStatus,
        next: ListingStatus,
        now: DateTime<Utc>,
    ) -> Result<Listing, StoreError>;

    fn remove_listing(&self, id: &ListingId, expected: ListingStatus) -> Result<(), StoreError>;

    fn review_target(&self, entity: EntityType, id: &str) -> Result<ReviewTarget, StoreError>;

    /// Write the status change, its comment, and its notification as one unit. Fails with
    /// [`StoreError::StatusChanged`] if the entity moved since `commit.target` was read.
    fn commit_review(&self, commit: ReviewCommit) -> Result<ReviewReceipt, StoreError>;

    fn append_comment(
        &self,
        comment: NewComment,
        now: DateTime<Utc>,
    ) -> Result<ReviewComment, StoreError>;

    fn comments(
        &self,
        entity: EntityType,
        id: &str,
        include_internal: bool,
    ) -> Result<Vec<ReviewComment>, StoreError>;

    fn review_queue(&self, include_finalized: bool) -> Result<Vec<SubmissionSummary>, StoreError>;

    /// Remove and return queued notifications in insertion order.
    fn drain_notifications(&self) -> Result<Vec<Notification>, StoreError>;

    /// Account deletion: cascades every record owned by the subject.
    fn delete_subject(&self, subject: &SubjectId) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("snapshot revision {expected} is stale (current revision {current})")]
    StaleRevision { expected: u64, current: u64 },
    #[error("{entity} {entity_id} changed concurrently (expected {expected}, found {found})")]
    StatusChanged {
        entity: EntityType,
        entity_id: String,
        expected: EntityStatus,
        found: EntityStatus,
    },
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),
    #[error("identity session {0} is not the subject's open session")]
    ForeignSession(String),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Requested identity change from a provider callback or a new session.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityUpdate {
    pub target: IdentityStatus,
    pub session_id: Option<String>,
    /// Fields reported by the provider; only fill profile fields still missing.
    pub prefill: ProfileFields,
    /// Provider verdict for `session_id`: the record must be PENDING on that session.
    pub verdict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Resubmitted,
    /// Fields replaced while review was still pending; status unchanged.
    Amended,
}

/// Current state of a reviewable entity as seen by the review protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewTarget {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub subject_id: SubjectId,
    pub status: EntityStatus,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub subject_id: SubjectId,
    pub author: SubjectId,
    pub author_role: AuthorRole,
    pub content: String,
    pub internal: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewCommit {
    pub target: ReviewTarget,
    pub next: EntityStatus,
    pub comment: Option<NewComment>,
    pub notification: Notification,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewReceipt {
    pub status: EntityStatus,
    pub comment: Option<ReviewComment>,
}

/// One row of the flattened admin review queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionSummary {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub subject_id: SubjectId,
    pub status: EntityStatus,
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct SubjectEntry {
    subject: VerificationSubject,
    identity: Option<IdentityVerification>,
    questionnaire: Option<InvestorQuestionnaire>,
    sponsor: Option<SponsorProfile>,
    revision: u64,
}

impl SubjectEntry {
    fn check_revision(&self, expected: Option<u64>) -> Result<(), StoreError> {
        match expected {
            Some(expected) if expected != self.revision => Err(StoreError::StaleRevision {
                expected,
                current: self.revision,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    subjects: BTreeMap<SubjectId, SubjectEntry>,
    listings: BTreeMap<ListingId, Listing>,
    comments: Vec<ReviewComment>,
    outbox: Vec<Notification>,
    sequence: u64,
    /// Never reused, even after a subject's comments are deleted.
    comment_sequence: u64,
}

impl StoreState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{:06}", self.sequence)
    }

    fn entry_mut(&mut self, subject: &SubjectId) -> Result<&mut SubjectEntry, StoreError> {
        self.subjects.get_mut(subject).ok_or(StoreError::NotFound)
    }

    fn bump(&mut self, subject: &SubjectId) {
        if let Some(entry) = self.subjects.get_mut(subject) {
            entry.revision += 1;
        }
    }

    fn find_owner(&self, entity: EntityType, id: &str) -> Option<SubjectId> {
        match entity {
            EntityType::Listing => self
                .listings
                .get(&ListingId(id.to_string()))
                .map(|listing| listing.owner.clone()),
            _ => self
                .subjects
                .values()
                .find(|entry| {
                    let record_id = match entity {
                        EntityType::Kyc => entry.identity.as_ref().map(|r| &r.id),
                        EntityType::Investor => entry.questionnaire.as_ref().map(|r| &r.id),
                        EntityType::Sponsor => entry.sponsor.as_ref().map(|r| &r.id),
                        EntityType::Listing => None,
                    };
                    record_id.is_some_and(|record_id| record_id.0 == id)
                })
                .map(|entry| entry.subject.id.clone()),
        }
    }

    fn target(&self, entity: EntityType, id: &str) -> Result<ReviewTarget, StoreError> {
        let subject_id = self.find_owner(entity, id).ok_or(StoreError::NotFound)?;
        let entry = self.subjects.get(&subject_id).ok_or(StoreError::NotFound)?;
        let display_name = display_name(&entry.subject);
        let (status, title) = match entity {
            EntityType::Kyc => {
                let record = entry.identity.as_ref().ok_or(StoreError::NotFound)?;
                (
                    EntityStatus::Identity(record.status),
                    format!("Identity verification for {display_name}"),
                )
            }
            EntityType::Investor => {
                let record = entry.questionnaire.as_ref().ok_or(StoreError::NotFound)?;
                (
                    EntityStatus::Submission(record.status),
                    format!("Investor questionnaire for {display_name}"),
                )
            }
            EntityType::Sponsor => {
                let record = entry.sponsor.as_ref().ok_or(StoreError::NotFound)?;
                (
                    EntityStatus::Submission(record.status),
                    record.details.business_legal_name.clone(),
                )
            }
            EntityType::Listing => {
                let listing = self
                    .listings
                    .get(&ListingId(id.to_string()))
                    .ok_or(StoreError::NotFound)?;
                (
                    EntityStatus::Listing(listing.status),
                    listing.details.title.clone(),
                )
            }
        };
        Ok(ReviewTarget {
            entity_type: entity,
            entity_id: id.to_string(),
            subject_id,
            status,
            title,
        })
    }

    fn push_comment(&mut self, comment: NewComment, now: DateTime<Utc>) -> ReviewComment {
        self.comment_sequence += 1;
        let stored = ReviewComment {
            id: self.comment_sequence,
            entity_type: comment.entity_type,
            entity_id: comment.entity_id,
            subject_id: comment.subject_id,
            author: comment.author,
            author_role: comment.author_role,
            content: comment.content,
            internal: comment.internal,
            created_at: now,
        };
        self.comments.push(stored.clone());
        stored
    }
}

fn display_name(subject: &VerificationSubject) -> String {
    match &subject.profile.username {
        Answer::Provided(username) => username.clone(),
        Answer::NotProvided => subject.id.to_string(),
    }
}

/// Mutex-backed store: each trait call runs inside one critical section.
#[derive(Debug, Default)]
pub struct InMemorySubmissionStore {
    state: Mutex<StoreState>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }

    /// Number of questionnaire records held for a subject (zero or one).
    pub fn questionnaire_count(&self, subject: &SubjectId) -> Result<usize, StoreError> {
        let state = self.lock()?;
        Ok(state
            .subjects
            .get(subject)
            .map_or(0, |entry| usize::from(entry.questionnaire.is_some())))
    }

    /// Notifications enqueued but not yet drained.
    pub fn pending_notifications(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.outbox.len())
    }
}

impl SubmissionStore for InMemorySubmissionStore {
    fn ensure_subject(
        &self,
        subject: &SubjectId,
        now: DateTime<Utc>,
    ) -> Result<VerificationSubject, StoreError> {
        let mut state = self.lock()?;
        let entry = state
            .subjects
            .entry(subject.clone())
            .or_insert_with(|| SubjectEntry {
                subject: VerificationSubject::new(subject.clone(), now),
                identity: None,
                questionnaire: None,
                sponsor: None,
                revision: 0,
            });
        Ok(entry.subject.clone())
    }

    fn snapshot(&self, subject: &SubjectId) -> Result<VerificationSnapshot, StoreError> {
        let state = self.lock()?;
        let entry = state.subjects.get(subject).ok_or(StoreError::NotFound)?;

        let mut snapshot = VerificationSnapshot::fresh(&entry.subject);
        snapshot.revision = entry.revision;
        snapshot.identity_status = entry
            .identity
            .as_ref()
            .map_or(IdentityStatus::NotStarted, |record| record.status);
        snapshot.questionnaire = entry.questionnaire.clone();
        snapshot.sponsor = entry.sponsor.clone();
        snapshot.listings = state
            .listings
            .values()
            .filter(|listing| &listing.owner == subject)
            .map(ListingSummary::from)
            .collect();
        snapshot.feedback = state
            .comments
            .iter()
            .filter(|comment| &comment.subject_id == subject && !comment.internal)
            .filter(|comment| comment.author_role == AuthorRole::Admin)
            .map(|comment| FeedbackNote {
                entity_type: comment.entity_type,
                entity_id: comment.entity_id.clone(),
                content: comment.content.clone(),
                created_at: comment.created_at,
            })
            .collect();
        Ok(snapshot)
    }

    fn username_available(
        &self,
        username: &str,
        requester: &SubjectId,
    ) -> Result<bool, StoreError> {
        let state = self.lock()?;
        Ok(!username_claimed(&state, username, requester))
    }

    fn update_profile(
        &self,
        subject: &SubjectId,
        profile: ProfileFields,
        expected_revision: Option<u64>,
        _now: DateTime<Utc>,
    ) -> Result<VerificationSubject, StoreError> {
        let mut state = self.lock()?;
        if let Answer::Provided(username) = &profile.username {
            if username_claimed(&state, username, subject) {
                return Err(StoreError::UsernameTaken(username.clone()));
            }
        }
        let entry = state.entry_mut(subject)?;
        entry.check_revision(expected_revision)?;
        entry.subject.profile = profile;
        entry.revision += 1;
        Ok(entry.subject.clone())
    }

    fn advance_identity(
        &self,
        subject: &SubjectId,
        update: IdentityUpdate,
        now: DateTime<Utc>,
    ) -> Result<IdentityVerification, StoreError> {
        let mut state = self.lock()?;
        if update.verdict {
            let entry = state.entry_mut(subject)?;
            let open = entry.identity.as_ref();
            let current = open.map_or(IdentityStatus::NotStarted, |record| record.status);
            if current != IdentityStatus::Pending {
                return Err(TransitionError::InvalidTransition {
                    entity: EntityType::Kyc,
                    current: current.to_string(),
                    requested: update.target.to_string(),
                }
                .into());
            }
            if open.and_then(|record| record.session_id.as_ref()) != update.session_id.as_ref() {
                return Err(StoreError::ForeignSession(update.session_id.unwrap_or_default()));
            }
        }
        let fresh_id = SubmissionId(state.next_id("kyc"));
        let entry = state.entry_mut(subject)?;

        let record = entry.identity.get_or_insert_with(|| IdentityVerification {
            id: fresh_id,
            subject_id: subject.clone(),
            status: IdentityStatus::NotStarted,
            session_id: None,
            created_at: now,
            updated_at: now,
        });

        let current = record.status;
        if current != update.target {
            let via_pending = matches!(
                update.target,
                IdentityStatus::Approved | IdentityStatus::Rejected
            ) && current != IdentityStatus::Pending;
            if via_pending {
                // A provider verdict implies the session passed through review.
                IdentityStatus::check(current, IdentityStatus::Pending)?;
                IdentityStatus::check(IdentityStatus::Pending, update.target)?;
            } else {
                IdentityStatus::check(current, update.target)?;
            }
            record.status = update.target;
        }
        if update.session_id.is_some() {
            record.session_id = update.session_id;
        }
        record.updated_at = now;
        let record = record.clone();

        if update.target == IdentityStatus::Approved {
            let profile = &mut entry.subject.profile;
            let prefill = update.prefill;
            profile.first_name =
                std::mem::take(&mut profile.first_name).or(prefill.first_name.normalized());
            profile.last_name =
                std::mem::take(&mut profile.last_name).or(prefill.last_name.normalized());
            profile.phone = std::mem::take(&mut profile.phone).or(prefill.phone.normalized());
        }
        entry.revision += 1;
        Ok(record)
    }

    fn upsert_questionnaire(
        &self,
        subject: &SubjectId,
        answers: QuestionnaireAnswers,
        skip_sponsor: bool,
        expected_revision: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<(InvestorQuestionnaire, UpsertOutcome), StoreError> {
        let mut state = self.lock()?;
        let fresh_id = SubmissionId(state.next_id("inv"));
        let entry = state.entry_mut(subject)?;
        entry.check_revision(expected_revision)?;

        let outcome = match entry.questionnaire.as_mut() {
            Some(existing) => {
                let outcome = resubmit(EntityType::Investor, existing.status)?;
                existing.answers = answers;
                existing.status = SubmissionStatus::Pending;
                existing.updated_at = now;
                outcome
            }
            None => {
                let status = check_submission(
                    EntityType::Investor,
                    SubmissionStatus::Unverified,
                    SubmissionStatus::Pending,
                )?;
                entry.questionnaire = Some(InvestorQuestionnaire {
                    id: fresh_id,
                    subject_id: subject.clone(),
                    answers,
                    status,
                    created_at: now,
                    updated_at: now,
                });
                UpsertOutcome::Created
            }
        };
        if skip_sponsor && entry.subject.sponsor_skipped_at.is_none() {
            entry.subject.sponsor_skipped_at = Some(now);
        }
        entry.revision += 1;
        let record = entry.questionnaire.clone().ok_or(StoreError::NotFound)?;
        Ok((record, outcome))
    }

    fn upsert_sponsor(
        &self,
        subject: &SubjectId,
        details: KybDetails,
        presentation: SponsorPresentation,
        expected_revision: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<(SponsorProfile, UpsertOutcome), StoreError> {
        let mut state = self.lock()?;
        let fresh_id = SubmissionId(state.next_id("kyb"));
        let entry = state.entry_mut(subject)?;
        entry.check_revision(expected_revision)?;

        let outcome = match entry.sponsor.as_mut() {
            Some(existing) => {
                let outcome = resubmit(EntityType::Sponsor, existing.status)?;
                existing.details = details;
                existing.presentation.bio = presentation.bio.or(existing.presentation.bio.clone());
                existing.presentation.wallet_address = presentation
                    .wallet_address
                    .or(existing.presentation.wallet_address.clone());
                existing.status = SubmissionStatus::Pending;
                existing.updated_at = now;
                outcome
            }
            None => {
                let status = check_submission(
                    EntityType::Sponsor,
                    SubmissionStatus::Unverified,
                    SubmissionStatus::Pending,
                )?;
                entry.sponsor = Some(SponsorProfile {
                    id: fresh_id,
                    subject_id: subject.clone(),
                    details,
                    presentation,
                    status,
                    created_at: now,
                    updated_at: now,
                });
                UpsertOutcome::Created
            }
        };
        entry.revision += 1;
        let record = entry.sponsor.clone().ok_or(StoreError::NotFound)?;
        Ok((record, outcome))
    }

    fn patch_sponsor(
        &self,
        subject: &SubjectId,
        patch: SponsorProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<SponsorProfile, StoreError> {
        let mut state = self.lock()?;
        let entry = state.entry_mut(subject)?;
        let sponsor = entry.sponsor.as_mut().ok_or(StoreError::NotFound)?;
        patch.apply(&mut sponsor.presentation);
        sponsor.updated_at = now;
        let record = sponsor.clone();
        entry.revision += 1;
        Ok(record)
    }

    fn insert_listing(
        &self,
        sponsor: &SubjectId,
        details: ListingDetails,
        now: DateTime<Utc>,
    ) -> Result<Listing, StoreError> {
        let mut state = self.lock()?;
        let sponsor_profile_id = state
            .subjects
            .get(sponsor)
            .and_then(|entry| entry.sponsor.as_ref())
            .map(|profile| profile.id.clone())
            .ok_or(StoreError::NotFound)?;
        let id = ListingId(state.next_id("lst"));
        let listing = Listing {
            id: id.clone(),
            sponsor_profile_id,
            owner: sponsor.clone(),
            details,
            status: ListingStatus::Draft,
            created_at: now,
            updated_at: now,
        };
        state.listings.insert(id, listing.clone());
        state.bump(sponsor);
        Ok(listing)
    }

    fn listing(&self, id: &ListingId) -> Result<Option<Listing>, StoreError> {
        Ok(self.lock()?.listings.get(id).cloned())
    }

    fn set_listing_status(
        &self,
        id: &ListingId,
        expected: ListingStatus,
        next: ListingStatus,
        now: DateTime<Utc>,
    ) -> Result<Listing, StoreError> {
        let mut state = self.lock()?;
        let listing = state.listings.get_mut(id).ok_or(StoreError::NotFound)?;
        if listing.status != expected {
            return Err(StoreError::StatusChanged {
                entity: EntityType::Listing,
                entity_id: id.to_string(),
                expected: EntityStatus::Listing(expected),
                found: EntityStatus::Listing(listing.status),
            });
        }
        listing.status = next;
        listing.updated_at = now;
        let listing = listing.clone();
        state.bump(&listing.owner);
        Ok(listing)
    }

    fn remove_listing(&self, id: &ListingId, expected: ListingStatus) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let listing = state.listings.get(id).ok_or(StoreError::NotFound)?;
        if listing.status != expected {
            return Err(StoreError::StatusChanged {
                entity: EntityType::Listing,
                entity_id: id.to_string(),
                expected: EntityStatus::Listing(expected),
                found: EntityStatus::Listing(listing.status),
            });
        }
        if let Some(removed) = state.listings.remove(id) {
            state.bump(&removed.owner);
        }
        Ok(())
    }

    fn review_target(&self, entity: EntityType, id: &str) -> Result<ReviewTarget, StoreError> {
        self.lock()?.target(entity, id)
    }

    fn commit_review(&self, commit: ReviewCommit) -> Result<ReviewReceipt, StoreError> {
        let mut state = self.lock()?;
        let ReviewCommit {
            target,
            next,
            comment,
            notification,
            at,
        } = commit;

        let current = state.target(target.entity_type, &target.entity_id)?;
        if current.status != target.status {
            return Err(StoreError::StatusChanged {
                entity: target.entity_type,
                entity_id: target.entity_id,
                expected: target.status,
                found: current.status,
            });
        }

        apply_status(&mut state, &current, next, at)?;
        let comment = comment.map(|comment| state.push_comment(comment, at));
        state.outbox.push(notification);
        state.bump(&current.subject_id);

        Ok(ReviewReceipt {
            status: next,
            comment,
        })
    }

    fn append_comment(
        &self,
        comment: NewComment,
        now: DateTime<Utc>,
    ) -> Result<ReviewComment, StoreError> {
        let mut state = self.lock()?;
        let owner = state
            .find_owner(comment.entity_type, &comment.entity_id)
            .ok_or(StoreError::NotFound)?;
        let comment = NewComment {
            subject_id: owner.clone(),
            ..comment
        };
        let stored = state.push_comment(comment, now);
        state.bump(&owner);
        Ok(stored)
    }

    fn comments(
        &self,
        entity: EntityType,
        id: &str,
        include_internal: bool,
    ) -> Result<Vec<ReviewComment>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .comments
            .iter()
            .filter(|comment| comment.entity_type == entity && comment.entity_id == id)
            .filter(|comment| include_internal || !comment.internal)
            .cloned()
            .collect())
    }

    fn review_queue(&self, include_finalized: bool) -> Result<Vec<SubmissionSummary>, StoreError> {
        let state = self.lock()?;
        let mut rows = Vec::new();

        for entry in state.subjects.values() {
            let name = display_name(&entry.subject);
            if let Some(record) = &entry.identity {
                rows.push(SubmissionSummary {
                    entity_type: EntityType::Kyc,
                    entity_id: record.id.to_string(),
                    subject_id: record.subject_id.clone(),
                    status: EntityStatus::Identity(record.status),
                    title: format!("Identity verification for {name}"),
                    updated_at: record.updated_at,
                });
            }
            if let Some(record) = &entry.questionnaire {
                rows.push(SubmissionSummary {
                    entity_type: EntityType::Investor,
                    entity_id: record.id.to_string(),
                    subject_id: record.subject_id.clone(),
                    status: EntityStatus::Submission(record.status),
                    title: format!("Investor questionnaire for {name}"),
                    updated_at: record.updated_at,
                });
            }
            if let Some(record) = &entry.sponsor {
                rows.push(SubmissionSummary {
                    entity_type: EntityType::Sponsor,
                    entity_id: record.id.to_string(),
                    subject_id: record.subject_id.clone(),
                    status: EntityStatus::Submission(record.status),
                    title: record.details.business_legal_name.clone(),
                    updated_at: record.updated_at,
                });
            }
        }
        for listing in state.listings.values() {
            rows.push(SubmissionSummary {
                entity_type: EntityType::Listing,
                entity_id: listing.id.to_string(),
                subject_id: listing.owner.clone(),
                status: EntityStatus::Listing(listing.status),
                title: listing.details.title.clone(),
                updated_at: listing.updated_at,
            });
        }

        rows.retain(|row| include_finalized || row.status.awaiting_review());
        rows.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        Ok(rows)
    }

    fn drain_notifications(&self) -> Result<Vec<Notification>, StoreError> {
        Ok(std::mem::take(&mut self.lock()?.outbox))
    }

    fn delete_subject(&self, subject: &SubjectId) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.subjects.remove(subject).ok_or(StoreError::NotFound)?;
        state.listings.retain(|_, listing| &listing.owner != subject);
        state.comments.retain(|comment| &comment.subject_id != subject);
        state
            .outbox
            .retain(|notification| &notification.subject_id != subject);
        for entry in state.subjects.values_mut() {
            if let Some(sponsor) = entry.sponsor.as_mut() {
                sponsor
                    .presentation
                    .voting_members
                    .retain(|member| &member.subject_id != subject);
            }
        }
        Ok(())
    }
}

fn username_claimed(state: &StoreState, username: &str, requester: &SubjectId) -> bool {
    state.subjects.values().any(|entry| {
        &entry.subject.id != requester
            && matches!(
                &entry.subject.profile.username,
                Answer::Provided(taken) if taken.eq_ignore_ascii_case(username)
            )
    })
}

/// Pending records are amended in place; everything else must legally re-enter PENDING.
fn resubmit(entity: EntityType, current: SubmissionStatus) -> Result<UpsertOutcome, StoreError> {
    if current == SubmissionStatus::Pending {
        return Ok(UpsertOutcome::Amended);
    }
    check_submission(entity, current, SubmissionStatus::Pending)?;
    Ok(UpsertOutcome::Resubmitted)
}

fn apply_status(
    state: &mut StoreState,
    target: &ReviewTarget,
    next: EntityStatus,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    let mismatch = || {
        StoreError::Unavailable(format!(
            "{} status {} does not belong to {}",
            target.entity_type, next, target.entity_id
        ))
    };
    match (target.entity_type, next) {
        (EntityType::Listing, EntityStatus::Listing(status)) => {
            let listing = state
                .listings
                .get_mut(&ListingId(target.entity_id.clone()))
                .ok_or(StoreError::NotFound)?;
            listing.status = status;
            listing.updated_at = at;
        }
        (EntityType::Kyc, EntityStatus::Identity(status)) => {
            let record = state
                .entry_mut(&target.subject_id)?
                .identity
                .as_mut()
                .ok_or(StoreError::NotFound)?;
            record.status = status;
            record.updated_at = at;
        }
        (EntityType::Investor, EntityStatus::Submission(status)) => {
            let record = state
                .entry_mut(&target.subject_id)?
                .questionnaire
                .as_mut()
                .ok_or(StoreError::NotFound)?;
            record.status = status;
            record.updated_at = at;
        }
        (EntityType::Sponsor, EntityStatus::Submission(status)) => {
            let record = state
                .entry_mut(&target.subject_id)?
                .sponsor
                .as_mut()
                .ok_or(StoreError::NotFound)?;
            record.status = status;
            record.updated_at = at;
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}
