use std::fmt;

use serde::Serialize;
use tracing::debug;

use super::gate::{compute_stage, OnboardingStage};
use super::snapshot::VerificationSnapshot;
use super::status::{IdentityStatus, SubmissionStatus};

const LOGIN_ROUTE: &str = "/login";

/// Predicates evaluated against a freshly fetched snapshot each time a protected action is
/// attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessGuard {
    Authenticated,
    /// KYC-gated actions such as investing.
    IdentityApproved,
    /// Both hard gates passed; required before any soft-gate submission.
    ProfileComplete,
    /// Listing authoring.
    SponsorVerified,
}

impl AccessGuard {
    pub const fn label(self) -> &'static str {
        match self {
            AccessGuard::Authenticated => "AUTHENTICATED",
            AccessGuard::IdentityApproved => "IDENTITY_APPROVED",
            AccessGuard::ProfileComplete => "PROFILE_COMPLETE",
            AccessGuard::SponsorVerified => "SPONSOR_VERIFIED",
        }
    }

    /// `None` means no authenticated subject.
    pub fn check(self, snapshot: Option<&VerificationSnapshot>) -> Result<(), GuardRedirect> {
        let Some(snapshot) = snapshot else {
            return Err(GuardRedirect::login(self));
        };

        let stage = match self {
            AccessGuard::Authenticated => None,
            AccessGuard::IdentityApproved => {
                let approved = snapshot.identity_status == IdentityStatus::Approved;
                (!approved).then_some(OnboardingStage::Identity)
            }
            AccessGuard::ProfileComplete => hard_gate(snapshot),
            AccessGuard::SponsorVerified => hard_gate(snapshot).or_else(|| {
                let verified = snapshot
                    .sponsor
                    .as_ref()
                    .is_some_and(|sponsor| sponsor.status == SubmissionStatus::Verified);
                (!verified).then_some(OnboardingStage::SponsorKyb)
            }),
        };

        match stage {
            None => Ok(()),
            Some(stage) => {
                debug!(
                    guard = %self,
                    %stage,
                    subject = %snapshot.subject_id,
                    "access guard redirect"
                );
                Err(GuardRedirect {
                    guard: self,
                    stage: Some(stage),
                    redirect: stage.deep_link(),
                })
            }
        }
    }
}

impl fmt::Display for AccessGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

fn hard_gate(snapshot: &VerificationSnapshot) -> Option<OnboardingStage> {
    let stage = compute_stage(&snapshot.clone().with_requested_stage(None)).stage;
    stage.is_hard_gate().then_some(stage)
}

/// Where a failed guard sends the subject to resolve the gap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardRedirect {
    pub guard: AccessGuard,
    pub stage: Option<OnboardingStage>,
    pub redirect: String,
}

impl GuardRedirect {
    fn login(guard: AccessGuard) -> Self {
        Self {
            guard,
            stage: None,
            redirect: LOGIN_ROUTE.to_string(),
        }
    }
}

impl fmt::Display for GuardRedirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} required; continue at {}", self.guard, self.redirect)
    }
}

/// Capability names accepted by the capability check endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardedAction {
    View,
    Invest,
    List,
}

impl GuardedAction {
    pub const fn guard(self) -> AccessGuard {
        match self {
            GuardedAction::View => AccessGuard::Authenticated,
            GuardedAction::Invest => AccessGuard::IdentityApproved,
            GuardedAction::List => AccessGuard::SponsorVerified,
        }
    }
}
