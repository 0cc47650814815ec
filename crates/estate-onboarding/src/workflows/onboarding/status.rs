//! Status enumerations for each verification stage and their legal predecessor tables.
//!
//! Every status change in the workflow goes through [`Transition::check`]; an illegal change
//! fails with [`TransitionError::InvalidTransition`] instead of being coerced.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reviewable entity kinds. Also used to tag review comments and queue rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Kyc,
    Investor,
    Sponsor,
    Listing,
}

impl EntityType {
    pub const fn label(self) -> &'static str {
        match self {
            EntityType::Kyc => "KYC",
            EntityType::Investor => "INVESTOR",
            EntityType::Sponsor => "SPONSOR",
            EntityType::Listing => "LISTING",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "KYC" | "IDENTITY" => Ok(EntityType::Kyc),
            "INVESTOR" => Ok(EntityType::Investor),
            "SPONSOR" | "KYB" => Ok(EntityType::Sponsor),
            "LISTING" => Ok(EntityType::Listing),
            _ => Err(UnknownEntityType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown entity type '{0}'")]
pub struct UnknownEntityType(pub String);

/// Identity (KYC) verification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityStatus {
    NotStarted,
    Pending,
    Approved,
    Rejected,
}

/// Shared status for the investor questionnaire and the sponsor KYB profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Unverified,
    Pending,
    Verified,
    Rejected,
    ActionRequired,
}

/// Lifecycle of a property listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Draft,
    PendingReview,
    Approved,
    Tokenizing,
    Active,
    FullyFunded,
    Rejected,
    Withdrawn,
    Frozen,
}

impl ListingStatus {
    pub const ALL: [ListingStatus; 9] = [
        ListingStatus::Draft,
        ListingStatus::PendingReview,
        ListingStatus::Approved,
        ListingStatus::Tokenizing,
        ListingStatus::Active,
        ListingStatus::FullyFunded,
        ListingStatus::Rejected,
        ListingStatus::Withdrawn,
        ListingStatus::Frozen,
    ];

    /// States from which the owning sponsor may withdraw.
    pub const WITHDRAWABLE: [ListingStatus; 3] = [
        ListingStatus::Draft,
        ListingStatus::PendingReview,
        ListingStatus::Approved,
    ];

    /// States from which the owning sponsor may resubmit for review.
    pub const RESUBMITTABLE: [ListingStatus; 2] =
        [ListingStatus::Rejected, ListingStatus::Withdrawn];

    /// States in which the owning sponsor may delete the listing outright.
    pub const DELETABLE: [ListingStatus; 3] = [
        ListingStatus::Draft,
        ListingStatus::Withdrawn,
        ListingStatus::Rejected,
    ];
}

/// Failure parsing a wire-level status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{value}' is not a recognised {entity} status")]
pub struct UnknownStatus {
    pub entity: EntityType,
    pub value: String,
}

/// Raised when a requested status change is not in the legal predecessor table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{entity} cannot move from {current} to {requested}")]
    InvalidTransition {
        entity: EntityType,
        current: String,
        requested: String,
    },
}

/// Behaviour shared by every status enumeration.
pub trait Transition: Copy + PartialEq + fmt::Display + Sized + 'static {
    const ENTITY: EntityType;

    /// Statuses from which `self` may legally be entered.
    fn predecessors(self) -> &'static [Self];

    /// Whether a subject is blocked and must act (and should be shown the latest feedback).
    fn needs_attention(self) -> bool;

    /// Terminal-positive state that unlocks gated capabilities.
    fn is_terminal_positive(self) -> bool;

    fn check(current: Self, requested: Self) -> Result<Self, TransitionError> {
        if requested.predecessors().contains(&current) {
            Ok(requested)
        } else {
            Err(TransitionError::InvalidTransition {
                entity: Self::ENTITY,
                current: current.to_string(),
                requested: requested.to_string(),
            })
        }
    }
}

impl Transition for IdentityStatus {
    const ENTITY: EntityType = EntityType::Kyc;

    fn predecessors(self) -> &'static [Self] {
        use IdentityStatus::*;
        match self {
            NotStarted => &[Rejected],
            Pending => &[NotStarted, Rejected],
            Approved => &[Pending],
            Rejected => &[Pending],
        }
    }

    fn needs_attention(self) -> bool {
        matches!(self, IdentityStatus::Pending | IdentityStatus::Rejected)
    }

    fn is_terminal_positive(self) -> bool {
        self == IdentityStatus::Approved
    }
}

impl Transition for SubmissionStatus {
    // Investor and sponsor share one table; callers relabel the entity when reporting.
    const ENTITY: EntityType = EntityType::Investor;

    fn predecessors(self) -> &'static [Self] {
        use SubmissionStatus::*;
        match self {
            Unverified => &[],
            Pending => &[Unverified, Rejected, ActionRequired],
            Verified => &[Pending],
            Rejected => &[Pending],
            ActionRequired => &[Pending],
        }
    }

    fn needs_attention(self) -> bool {
        matches!(
            self,
            SubmissionStatus::Rejected | SubmissionStatus::ActionRequired
        )
    }

    fn is_terminal_positive(self) -> bool {
        self == SubmissionStatus::Verified
    }
}

impl Transition for ListingStatus {
    const ENTITY: EntityType = EntityType::Listing;

    fn predecessors(self) -> &'static [Self] {
        use ListingStatus::*;
        match self {
            Draft => &[],
            PendingReview => &[Draft, Rejected, Withdrawn],
            Approved => &[PendingReview],
            Tokenizing => &[PendingReview, Approved],
            Active => &[Tokenizing],
            FullyFunded => &[Active],
            Rejected => &[PendingReview],
            Withdrawn => &[Draft, PendingReview, Approved],
            Frozen => &[PendingReview, Approved, Tokenizing, Active, FullyFunded],
        }
    }

    fn needs_attention(self) -> bool {
        matches!(self, ListingStatus::Rejected | ListingStatus::Frozen)
    }

    fn is_terminal_positive(self) -> bool {
        matches!(self, ListingStatus::Active | ListingStatus::FullyFunded)
    }
}

/// Status of any reviewable entity, tagged by its enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EntityStatus {
    Identity(IdentityStatus),
    Submission(SubmissionStatus),
    Listing(ListingStatus),
}

impl EntityStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EntityStatus::Identity(status) => status.label(),
            EntityStatus::Submission(status) => status.label(),
            EntityStatus::Listing(status) => status.label(),
        }
    }

    /// Whether a review queue should still show the entity by default.
    pub fn awaiting_review(self) -> bool {
        matches!(
            self,
            EntityStatus::Identity(IdentityStatus::Pending)
                | EntityStatus::Submission(SubmissionStatus::Pending)
                | EntityStatus::Listing(ListingStatus::PendingReview)
        )
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Check a questionnaire or sponsor transition, reporting it against the given entity.
pub fn check_submission(
    entity: EntityType,
    current: SubmissionStatus,
    requested: SubmissionStatus,
) -> Result<SubmissionStatus, TransitionError> {
    SubmissionStatus::check(current, requested).map_err(|err| match err {
        TransitionError::InvalidTransition {
            current, requested, ..
        } => TransitionError::InvalidTransition {
            entity,
            current,
            requested,
        },
    })
}

macro_rules! wire_labels {
    ($ty:ident, $entity:expr, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            pub const fn label(self) -> &'static str {
                match self {
                    $($ty::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownStatus;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim() {
                    $($label => Ok($ty::$variant),)+
                    _ => Err(UnknownStatus {
                        entity: $entity,
                        value: value.to_string(),
                    }),
                }
            }
        }
    };
}

wire_labels!(IdentityStatus, EntityType::Kyc, {
    NotStarted => "NOT_STARTED",
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

wire_labels!(SubmissionStatus, EntityType::Investor, {
    Unverified => "UNVERIFIED",
    Pending => "PENDING",
    Verified => "VERIFIED",
    Rejected => "REJECTED",
    ActionRequired => "ACTION_REQUIRED",
});

wire_labels!(ListingStatus, EntityType::Listing, {
    Draft => "DRAFT",
    PendingReview => "PENDING_REVIEW",
    Approved => "APPROVED",
    Tokenizing => "TOKENIZING",
    Active => "ACTIVE",
    FullyFunded => "FULLY_FUNDED",
    Rejected => "REJECTED",
    Withdrawn => "WITHDRAWN",
    Frozen => "FROZEN",
});
