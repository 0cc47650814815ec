//! Contracts for the collaborators the workflow consumes but does not implement.

use serde::{Deserialize, Serialize};

use super::domain::{Answer, Notification, ProfileFields, SubjectId};
use super::status::IdentityStatus;

/// External identity-verification vendor.
pub trait IdentityVerificationProvider: Send + Sync {
    fn create_session(&self, subject: &SubjectId) -> Result<IdentitySession, ProviderError>;
    fn check_status(&self, session_id: &str) -> Result<IdentityCheck, ProviderError>;
}

/// Fire-and-forget delivery of user-facing notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), ProviderError>;
}

/// Resolves a bearer token to the authenticated principal.
pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, bearer_token: &str) -> Option<Principal>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySession {
    pub session_id: String,
    /// Opaque token handed to the client-side verification widget.
    pub session_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityOutcome {
    Approved,
    Pending,
    Rejected,
}

impl From<IdentityOutcome> for IdentityStatus {
    fn from(outcome: IdentityOutcome) -> Self {
        match outcome {
            IdentityOutcome::Approved => IdentityStatus::Approved,
            IdentityOutcome::Pending => IdentityStatus::Pending,
            IdentityOutcome::Rejected => IdentityStatus::Rejected,
        }
    }
}

/// Result of polling a verification session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCheck {
    pub outcome: IdentityOutcome,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl IdentityCheck {
    /// Profile fields the vendor reported, for filling gaps in the subject's profile.
    pub fn prefill(&self) -> ProfileFields {
        ProfileFields {
            username: Answer::NotProvided,
            first_name: self.first_name.clone().into(),
            last_name: self.last_name.clone().into(),
            phone: self.phone.clone().into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject_id: SubjectId,
    #[serde(default)]
    pub admin: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("identity provider unavailable: {0}")]
    Identity(String),
    #[error("notification sink unavailable: {0}")]
    Notification(String),
}
