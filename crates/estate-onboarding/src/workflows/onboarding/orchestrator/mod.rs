//! Request-driven onboarding transitions.
//!
//! Every operation starts from a freshly fetched snapshot and ends by re-running the gate
//! against a second fresh snapshot, so no stage decision outlives the request that made it.

mod username;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domain::{
    Answer, FieldError, InvestorQuestionnaire, KybSubmission, ProfileFields,
    QuestionnaireSubmission, SponsorProfile, SponsorProfilePatch, SubjectId,
};
use super::gate::{compute_stage, OnboardingStage, StageDecision};
use super::guards::AccessGuard;
use super::providers::{IdentityCheck, IdentitySession, IdentityVerificationProvider};
use super::service::OnboardingError;
use super::snapshot::VerificationSnapshot;
use super::status::{IdentityStatus, Transition};
use super::store::{IdentityUpdate, StoreError, SubmissionStore, UpsertOutcome};

pub use username::{ProfileError, UsernameAvailability, UsernamePolicy, UsernameTicket};

/// Fresh snapshot plus the gate's verdict on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageView {
    pub snapshot: VerificationSnapshot,
    pub decision: StageDecision,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentitySessionView {
    pub session: IdentitySession,
    pub onboarding: StageView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionView<T> {
    pub record: T,
    pub outcome: UpsertOutcome,
    pub onboarding: StageView,
}

/// How the subject came back from the external identity flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityResume {
    Completed { session_id: String },
    Exited,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResumeRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub exited: bool,
}

impl From<IdentityResumeRequest> for IdentityResume {
    fn from(request: IdentityResumeRequest) -> Self {
        match request.session_id {
            Some(session_id) if !request.exited && !session_id.trim().is_empty() => {
                IdentityResume::Completed { session_id }
            }
            _ => IdentityResume::Exited,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileSubmission {
    pub username: String,
    #[serde(default)]
    pub first_name: Answer<String>,
    #[serde(default)]
    pub last_name: Answer<String>,
    #[serde(default)]
    pub phone: Answer<String>,
    #[serde(default, rename = "expectedRevision")]
    pub expected_revision: Option<u64>,
}

/// Whether the investor stage should lead on to the sponsor stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitIntent {
    #[default]
    Continue,
    /// Skip sponsor onboarding; it stays reachable through its deep link.
    Finish,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QuestionnaireRequest {
    #[serde(flatten)]
    pub answers: QuestionnaireSubmission,
    #[serde(default)]
    pub intent: SubmitIntent,
    #[serde(default, rename = "expectedRevision")]
    pub expected_revision: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct KybRequest {
    #[serde(flatten)]
    pub submission: KybSubmission,
    #[serde(default, rename = "expectedRevision")]
    pub expected_revision: Option<u64>,
}

pub struct OnboardingOrchestrator<S> {
    store: Arc<S>,
    identity: Arc<dyn IdentityVerificationProvider>,
    usernames: UsernamePolicy,
}

impl<S> OnboardingOrchestrator<S>
where
    S: SubmissionStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        identity: Arc<dyn IdentityVerificationProvider>,
        usernames: UsernamePolicy,
    ) -> Self {
        Self {
            store,
            identity,
            usernames,
        }
    }

    pub fn username_policy(&self) -> UsernamePolicy {
        self.usernames
    }

    /// Page entry: fetch a fresh snapshot and decide the stage.
    pub fn enter(
        &self,
        subject: &SubjectId,
        requested: Option<OnboardingStage>,
    ) -> Result<StageView, OnboardingError> {
        let snapshot = self.store.snapshot(subject)?.with_requested_stage(requested);
        let decision = compute_stage(&snapshot);
        Ok(StageView { snapshot, decision })
    }

    /// Open a provider session and move identity to PENDING.
    pub fn start_identity_check(
        &self,
        subject: &SubjectId,
        now: DateTime<Utc>,
    ) -> Result<IdentitySessionView, OnboardingError> {
        let current = self.store.snapshot(subject)?.identity_status;
        if current != IdentityStatus::Pending {
            IdentityStatus::check(current, IdentityStatus::Pending)?;
        }

        let session = self.identity.create_session(subject).map_err(|error| {
            warn!(%subject, %error, "identity session could not be created");
            error
        })?;

        self.store.advance_identity(
            subject,
            IdentityUpdate {
                target: IdentityStatus::Pending,
                session_id: Some(session.session_id.clone()),
                prefill: ProfileFields::default(),
                verdict: false,
            },
            now,
        )?;
        info!(%subject, session_id = %session.session_id, "identity session started");

        Ok(IdentitySessionView {
            session,
            onboarding: self.enter(subject, None)?,
        })
    }

    /// Resume after the external identity flow. Exiting the flow changes nothing.
    pub fn resume_after_identity_check(
        &self,
        subject: &SubjectId,
        resume: IdentityResume,
        now: DateTime<Utc>,
    ) -> Result<StageView, OnboardingError> {
        let session_id = match resume {
            IdentityResume::Exited => {
                debug!(%subject, "identity flow exited");
                return self.enter(subject, None);
            }
            IdentityResume::Completed { session_id } => session_id,
        };

        let current = self.store.snapshot(subject)?.identity_status;
        if current == IdentityStatus::Approved {
            return self.enter(subject, None);
        }

        let check: IdentityCheck = self.identity.check_status(&session_id).map_err(|error| {
            warn!(%subject, %session_id, %error, "identity status check failed");
            error
        })?;
        let target = IdentityStatus::from(check.outcome);
        let record = self.store.advance_identity(
            subject,
            IdentityUpdate {
                target,
                session_id: Some(session_id),
                prefill: check.prefill(),
                verdict: true,
            },
            now,
        )?;
        info!(%subject, status = %record.status, "identity check resumed");

        self.enter(subject, None)
    }

    /// Clear a rejected identity attempt back to NOT_STARTED.
    pub fn reset_identity(
        &self,
        subject: &SubjectId,
        now: DateTime<Utc>,
    ) -> Result<StageView, OnboardingError> {
        self.store.advance_identity(
            subject,
            IdentityUpdate {
                target: IdentityStatus::NotStarted,
                session_id: None,
                prefill: ProfileFields::default(),
                verdict: false,
            },
            now,
        )?;
        info!(%subject, "identity verification reset");
        self.enter(subject, None)
    }

    /// Format check followed by a store lookup.
    pub fn check_username(&self, subject: &SubjectId, raw: &str) -> Result<bool, OnboardingError> {
        let username = self.usernames.validate(raw)?;
        Ok(self.store.username_available(&username, subject)?)
    }

    pub fn submit_profile(
        &self,
        subject: &SubjectId,
        submission: ProfileSubmission,
        now: DateTime<Utc>,
    ) -> Result<StageView, OnboardingError> {
        let snapshot = self.store.snapshot(subject)?;
        AccessGuard::IdentityApproved.check(Some(&snapshot))?;

        let username = self.usernames.validate(&submission.username)?;
        let existing = snapshot.profile;
        let profile = ProfileFields {
            username: Answer::Provided(username.clone()),
            first_name: submission.first_name.normalized().or(existing.first_name),
            last_name: submission.last_name.normalized().or(existing.last_name),
            phone: submission.phone.normalized().or(existing.phone),
        };

        self.store.update_profile(subject, profile, submission.expected_revision, now)?;
        info!(%subject, %username, "profile submitted");

        self.enter(subject, None)
    }

    pub fn submit_questionnaire(
        &self,
        subject: &SubjectId,
        request: QuestionnaireRequest,
        now: DateTime<Utc>,
    ) -> Result<SubmissionView<InvestorQuestionnaire>, OnboardingError> {
        let snapshot = self.store.snapshot(subject)?;
        AccessGuard::ProfileComplete.check(Some(&snapshot))?;

        let answers = request.answers.validate()?;
        let (record, outcome) = self.store.upsert_questionnaire(
            subject,
            answers,
            request.intent == SubmitIntent::Finish,
            request.expected_revision,
            now,
        )?;
        info!(
            %subject,
            ?outcome,
            status = %record.status,
            intent = ?request.intent,
            "investor questionnaire submitted"
        );

        Ok(SubmissionView {
            record,
            outcome,
            onboarding: self.enter(subject, None)?,
        })
    }

    pub fn submit_sponsor_kyb(
        &self,
        subject: &SubjectId,
        request: KybRequest,
        now: DateTime<Utc>,
    ) -> Result<SubmissionView<SponsorProfile>, OnboardingError> {
        let snapshot = self.store.snapshot(subject)?;
        AccessGuard::ProfileComplete.check(Some(&snapshot))?;

        let (details, presentation) = request.submission.validate()?;
        let (record, outcome) = self.store.upsert_sponsor(
            subject,
            details,
            presentation,
            request.expected_revision,
            now,
        )?;
        info!(%subject, ?outcome, status = %record.status, "sponsor KYB submitted");

        Ok(SubmissionView {
            record,
            outcome,
            onboarding: self.enter(subject, None)?,
        })
    }

    /// Presentation-only changes; the profile's verification status is untouched.
    pub fn update_sponsor_profile(
        &self,
        subject: &SubjectId,
        patch: SponsorProfilePatch,
        now: DateTime<Utc>,
    ) -> Result<SponsorProfile, OnboardingError> {
        patch.validate(subject)?;
        for member in patch.voting_members.iter().flatten() {
            match self.store.snapshot(&member.subject_id) {
                Ok(_) => {}
                Err(StoreError::NotFound) => {
                    return Err(FieldError::Invalid {
                        field: "voting_members",
                        reason: format!("{} is not a registered subject", member.subject_id),
                    }
                    .into())
                }
                Err(other) => return Err(other.into()),
            }
        }

        let profile = self.store.patch_sponsor(subject, patch, now)?;
        info!(
            %subject,
            voting_members = profile.presentation.voting_members.len(),
            "sponsor profile updated"
        );
        Ok(profile)
    }
}
