//! Admin review protocol: parse an action for an entity type, validate it against the
//! entity's current status, then commit the status change, comment, and notification as
//! one unit.

mod actions;
mod desk;

use serde::{Deserialize, Serialize};

use super::status::{EntityType, TransitionError};

pub use actions::{plan_review, ListingAction, ReviewCommand, ReviewPlan, VerificationAction};
pub use desk::ReviewDesk;

/// Body of `POST admin/submissions/:type/:id/review`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRequest {
    pub action: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub new_status: Option<String>,
}

/// Client-correctable and admin-UI failures raised before any state changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("{action} on {entity} requires a comment")]
    MissingRequiredComment {
        entity: EntityType,
        action: &'static str,
    },
    #[error("'{action}' is not a supported action for {entity}")]
    UnsupportedAction { entity: EntityType, action: String },
    #[error("'{value}' is not a listing status")]
    InvalidStatus { value: String },
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}
