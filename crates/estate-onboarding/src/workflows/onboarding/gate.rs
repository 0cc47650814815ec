//! Pure evaluation of a verification snapshot into the next onboarding stage and the
//! capabilities currently unlocked.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::snapshot::VerificationSnapshot;
use super::status::{EntityType, IdentityStatus, SubmissionStatus, Transition};

/// Steps of the onboarding sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnboardingStage {
    Identity,
    Profile,
    InvestorProfile,
    SponsorKyb,
    Completed,
}

impl OnboardingStage {
    pub const fn label(self) -> &'static str {
        match self {
            OnboardingStage::Identity => "IDENTITY",
            OnboardingStage::Profile => "PROFILE",
            OnboardingStage::InvestorProfile => "INVESTOR_PROFILE",
            OnboardingStage::SponsorKyb => "SPONSOR_KYB",
            OnboardingStage::Completed => "COMPLETED",
        }
    }

    /// Hard gates are strictly sequential and cannot be deep-linked past.
    pub const fn is_hard_gate(self) -> bool {
        matches!(self, OnboardingStage::Identity | OnboardingStage::Profile)
    }

    /// Client route that renders this stage.
    pub fn deep_link(self) -> String {
        format!("/onboarding?stage={}", self.label().to_ascii_lowercase())
    }
}

impl fmt::Display for OnboardingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown onboarding stage '{0}'")]
pub struct UnknownStage(pub String);

impl FromStr for OnboardingStage {
    type Err = UnknownStage;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "IDENTITY" | "KYC" => Ok(OnboardingStage::Identity),
            "PROFILE" => Ok(OnboardingStage::Profile),
            "INVESTOR_PROFILE" | "INVESTOR" => Ok(OnboardingStage::InvestorProfile),
            "SPONSOR_KYB" | "SPONSOR" => Ok(OnboardingStage::SponsorKyb),
            "COMPLETED" => Ok(OnboardingStage::Completed),
            _ => Err(UnknownStage(value.to_string())),
        }
    }
}

/// What the subject may do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_view: bool,
    /// Identity approved and a questionnaire on file in any status. Investing is
    /// deliberately allowed while accreditation review is still pending.
    pub can_invest: bool,
    pub can_list: bool,
}

/// Modal explaining why the subject is held on a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingNotice {
    pub entity_type: EntityType,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDecision {
    pub stage: OnboardingStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking: Option<BlockingNotice>,
    pub capabilities: Capabilities,
}

pub fn capabilities(snapshot: &VerificationSnapshot) -> Capabilities {
    Capabilities {
        can_view: true,
        can_invest: snapshot.identity_status == IdentityStatus::Approved
            && snapshot.questionnaire.is_some(),
        can_list: snapshot
            .sponsor
            .as_ref()
            .is_some_and(|sponsor| sponsor.status == SubmissionStatus::Verified),
    }
}

/// Decide which stage to present. First matching rule wins.
pub fn compute_stage(snapshot: &VerificationSnapshot) -> StageDecision {
    let capabilities = capabilities(snapshot);
    let decide = |stage, blocking| StageDecision {
        stage,
        blocking,
        capabilities,
    };

    if snapshot.identity_status != IdentityStatus::Approved {
        return decide(OnboardingStage::Identity, identity_notice(snapshot));
    }

    if !snapshot.has_username() {
        return decide(OnboardingStage::Profile, None);
    }

    if let Some(requested) = snapshot.requested_stage.filter(|stage| !stage.is_hard_gate()) {
        return decide(requested, soft_stage_notice(snapshot, requested));
    }

    let questionnaire_status = snapshot.questionnaire.as_ref().map(|q| q.status);
    if questionnaire_status.map_or(true, |status| status.needs_attention()) {
        return decide(
            OnboardingStage::InvestorProfile,
            soft_stage_notice(snapshot, OnboardingStage::InvestorProfile),
        );
    }

    match snapshot.sponsor.as_ref().map(|sponsor| sponsor.status) {
        None if !snapshot.sponsor_skipped => decide(OnboardingStage::SponsorKyb, None),
        Some(status) if status.needs_attention() => decide(
            OnboardingStage::SponsorKyb,
            soft_stage_notice(snapshot, OnboardingStage::SponsorKyb),
        ),
        _ => decide(OnboardingStage::Completed, None),
    }
}

fn identity_notice(snapshot: &VerificationSnapshot) -> Option<BlockingNotice> {
    let message = match snapshot.identity_status {
        IdentityStatus::Pending => "Your identity verification is being processed.",
        IdentityStatus::Rejected => "Your identity verification was not approved.",
        IdentityStatus::NotStarted | IdentityStatus::Approved => return None,
    };
    Some(BlockingNotice {
        entity_type: EntityType::Kyc,
        status: snapshot.identity_status.to_string(),
        message: message.to_string(),
        feedback: feedback_for(snapshot, EntityType::Kyc),
    })
}

fn soft_stage_notice(
    snapshot: &VerificationSnapshot,
    stage: OnboardingStage,
) -> Option<BlockingNotice> {
    let (entity_type, status) = match stage {
        OnboardingStage::InvestorProfile => (
            EntityType::Investor,
            snapshot.questionnaire.as_ref().map(|q| q.status),
        ),
        OnboardingStage::SponsorKyb => (
            EntityType::Sponsor,
            snapshot.sponsor.as_ref().map(|sponsor| sponsor.status),
        ),
        _ => return None,
    };
    let status = status.filter(|status| status.needs_attention())?;
    let message = match status {
        SubmissionStatus::ActionRequired => "Additional information is required.",
        _ => "Your submission was not approved.",
    };
    Some(BlockingNotice {
        entity_type,
        status: status.to_string(),
        message: message.to_string(),
        feedback: feedback_for(snapshot, entity_type),
    })
}

fn feedback_for(snapshot: &VerificationSnapshot, entity: EntityType) -> Option<String> {
    snapshot
        .latest_feedback(entity)
        .map(|note| note.content.clone())
}
