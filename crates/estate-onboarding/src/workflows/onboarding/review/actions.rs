use std::fmt;

use super::super::gate::OnboardingStage;
use super::super::status::{
    check_submission, EntityStatus, EntityType, IdentityStatus, ListingStatus, SubmissionStatus,
    Transition, TransitionError,
};
use super::ReviewError;

/// Decisions available on identity, investor and sponsor submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationAction {
    Approve,
    Reject,
    RequestInfo,
}

/// Decisions available on listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingAction {
    Tokenize,
    Freeze,
    /// Administrative override; the transition table is not consulted.
    UpdateStatus(ListingStatus),
}

/// A parsed review action, tagged by the entity it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewCommand {
    Kyc(VerificationAction),
    Investor(VerificationAction),
    Sponsor(VerificationAction),
    Listing(ListingAction),
}

impl VerificationAction {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationAction::Approve => "APPROVE",
            VerificationAction::Reject => "REJECT",
            VerificationAction::RequestInfo => "REQUEST_INFO",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "APPROVE" => Some(VerificationAction::Approve),
            "REJECT" => Some(VerificationAction::Reject),
            "REQUEST_INFO" => Some(VerificationAction::RequestInfo),
            _ => None,
        }
    }

    fn requires_comment(self) -> bool {
        !matches!(self, VerificationAction::Approve)
    }
}

impl ListingAction {
    pub const fn label(self) -> &'static str {
        match self {
            ListingAction::Tokenize => "TOKENIZE",
            ListingAction::Freeze => "FREEZE",
            ListingAction::UpdateStatus(_) => "UPDATE_STATUS",
        }
    }

    fn requires_comment(self) -> bool {
        matches!(self, ListingAction::UpdateStatus(ListingStatus::Rejected))
    }
}

impl ReviewCommand {
    /// Parse the wire-level action for an entity. `new_status` is only read for
    /// `UPDATE_STATUS`.
    pub fn parse(
        entity: EntityType,
        action: &str,
        new_status: Option<&str>,
    ) -> Result<Self, ReviewError> {
        let normalized = action.trim().to_ascii_uppercase();
        let unsupported = || ReviewError::UnsupportedAction {
            entity,
            action: action.to_string(),
        };

        if entity == EntityType::Listing {
            let listing_action = match normalized.as_str() {
                "TOKENIZE" => ListingAction::Tokenize,
                "FREEZE" => ListingAction::Freeze,
                "UPDATE_STATUS" => {
                    let value = new_status.unwrap_or_default();
                    let status = value.trim().parse::<ListingStatus>().map_err(|_| {
                        ReviewError::InvalidStatus {
                            value: value.to_string(),
                        }
                    })?;
                    ListingAction::UpdateStatus(status)
                }
                _ => return Err(unsupported()),
            };
            return Ok(ReviewCommand::Listing(listing_action));
        }

        let verification = VerificationAction::parse(&normalized).ok_or_else(unsupported)?;
        Ok(match entity {
            EntityType::Kyc => ReviewCommand::Kyc(verification),
            EntityType::Investor => ReviewCommand::Investor(verification),
            EntityType::Sponsor => ReviewCommand::Sponsor(verification),
            EntityType::Listing => return Err(unsupported()),
        })
    }

    pub const fn entity(self) -> EntityType {
        match self {
            ReviewCommand::Kyc(_) => EntityType::Kyc,
            ReviewCommand::Investor(_) => EntityType::Investor,
            ReviewCommand::Sponsor(_) => EntityType::Sponsor,
            ReviewCommand::Listing(_) => EntityType::Listing,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ReviewCommand::Kyc(action)
            | ReviewCommand::Investor(action)
            | ReviewCommand::Sponsor(action) => action.label(),
            ReviewCommand::Listing(action) => action.label(),
        }
    }

    fn requires_comment(self) -> bool {
        match self {
            ReviewCommand::Kyc(action)
            | ReviewCommand::Investor(action)
            | ReviewCommand::Sponsor(action) => action.requires_comment(),
            ReviewCommand::Listing(action) => action.requires_comment(),
        }
    }

    /// Status the command moves the entity to.
    pub fn target(self) -> EntityStatus {
        use VerificationAction::*;
        match self {
            // Identity has no ACTION_REQUIRED state; asking for more information rejects the
            // attempt so the subject can retry with a new session.
            ReviewCommand::Kyc(Approve) => EntityStatus::Identity(IdentityStatus::Approved),
            ReviewCommand::Kyc(Reject | RequestInfo) => {
                EntityStatus::Identity(IdentityStatus::Rejected)
            }
            ReviewCommand::Investor(action) | ReviewCommand::Sponsor(action) => {
                EntityStatus::Submission(match action {
                    Approve => SubmissionStatus::Verified,
                    Reject => SubmissionStatus::Rejected,
                    RequestInfo => SubmissionStatus::ActionRequired,
                })
            }
            ReviewCommand::Listing(ListingAction::Tokenize) => {
                EntityStatus::Listing(ListingStatus::Tokenizing)
            }
            ReviewCommand::Listing(ListingAction::Freeze) => {
                EntityStatus::Listing(ListingStatus::Frozen)
            }
            ReviewCommand::Listing(ListingAction::UpdateStatus(status)) => {
                EntityStatus::Listing(status)
            }
        }
    }
}

impl fmt::Display for ReviewCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.entity(), self.label())
    }
}

/// Validated outcome of a review command against the entity's current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPlan {
    pub command: ReviewCommand,
    pub current: EntityStatus,
    pub next: EntityStatus,
    /// Trimmed comment; `None` when the reviewer left it blank.
    pub comment: Option<String>,
}

/// Validate a command without touching storage: comment requirements first, then the
/// transition table (skipped for `UPDATE_STATUS`).
pub fn plan_review(
    command: ReviewCommand,
    current: EntityStatus,
    comment: Option<&str>,
) -> Result<ReviewPlan, ReviewError> {
    let comment = comment
        .map(str::trim)
        .filter(|content| !content.is_empty())
        .map(str::to_string);
    if comment.is_none() && command.requires_comment() {
        return Err(ReviewError::MissingRequiredComment {
            entity: command.entity(),
            action: command.label(),
        });
    }

    let next = command.target();
    let entity = command.entity();
    match (command, current, next) {
        (ReviewCommand::Listing(ListingAction::UpdateStatus(_)), EntityStatus::Listing(_), _) => {}
        (ReviewCommand::Kyc(_), EntityStatus::Identity(from), EntityStatus::Identity(to)) => {
            IdentityStatus::check(from, to)?;
        }
        (
            ReviewCommand::Investor(_) | ReviewCommand::Sponsor(_),
            EntityStatus::Submission(from),
            EntityStatus::Submission(to),
        ) => {
            check_submission(entity, from, to)?;
        }
        (ReviewCommand::Listing(_), EntityStatus::Listing(from), EntityStatus::Listing(to)) => {
            ListingStatus::check(from, to)?;
        }
        _ => {
            return Err(TransitionError::InvalidTransition {
                entity,
                current: current.to_string(),
                requested: next.to_string(),
            }
            .into())
        }
    }

    Ok(ReviewPlan {
        command,
        current,
        next,
        comment,
    })
}

impl ReviewPlan {
    /// Title and body of the notification summarising the decision.
    pub fn notice(&self, entity_title: &str) -> (String, String) {
        let subject = match self.command.entity() {
            EntityType::Kyc => "Identity verification",
            EntityType::Investor => "Investor profile",
            EntityType::Sponsor => "Sponsor profile",
            EntityType::Listing => "Listing",
        };
        let title = match self.command {
            ReviewCommand::Kyc(VerificationAction::Approve)
            | ReviewCommand::Investor(VerificationAction::Approve)
            | ReviewCommand::Sponsor(VerificationAction::Approve) => format!("{subject} approved"),
            ReviewCommand::Kyc(VerificationAction::Reject)
            | ReviewCommand::Investor(VerificationAction::Reject)
            | ReviewCommand::Sponsor(VerificationAction::Reject) => {
                format!("{subject} not approved")
            }
            ReviewCommand::Kyc(VerificationAction::RequestInfo)
            | ReviewCommand::Investor(VerificationAction::RequestInfo)
            | ReviewCommand::Sponsor(VerificationAction::RequestInfo) => {
                format!("{subject} needs more information")
            }
            ReviewCommand::Listing(ListingAction::Tokenize) => {
                format!("{entity_title} is being tokenized")
            }
            ReviewCommand::Listing(ListingAction::Freeze) => format!("{entity_title} was frozen"),
            ReviewCommand::Listing(ListingAction::UpdateStatus(status)) => {
                format!("{entity_title} is now {status}")
            }
        };
        let message = match &self.comment {
            Some(comment) => comment.clone(),
            None => format!("{entity_title} moved from {} to {}.", self.current, self.next),
        };
        (title, message)
    }

    /// Client route where the subject can act on the decision.
    pub fn link(&self, entity_id: &str) -> String {
        match self.command.entity() {
            EntityType::Kyc => OnboardingStage::Identity.deep_link(),
            EntityType::Investor => OnboardingStage::InvestorProfile.deep_link(),
            EntityType::Sponsor => OnboardingStage::SponsorKyb.deep_link(),
            EntityType::Listing => format!("/sponsor/listings/{entity_id}"),
        }
    }
}
