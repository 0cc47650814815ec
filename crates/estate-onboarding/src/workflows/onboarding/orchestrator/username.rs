use chrono::{DateTime, Duration, Utc};

use crate::config::OnboardingConfig;

/// Profile-stage validation failures, surfaced next to the username field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("username '{0}' is already taken")]
    UsernameTaken(String),
    #[error("username '{username}' is invalid: {reason}")]
    UsernameInvalidFormat { username: String, reason: String },
    #[error("username availability has not been confirmed yet")]
    UsernameCheckPending,
}

/// Length bounds and character rules for usernames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsernamePolicy {
    pub min_len: usize,
    pub max_len: usize,
}

impl UsernamePolicy {
    pub fn from_config(config: &OnboardingConfig) -> Self {
        Self {
            min_len: config.username_min_len,
            max_len: config.username_max_len,
        }
    }

    /// ASCII letters, digits and underscores within the configured length.
    pub fn validate(&self, raw: &str) -> Result<String, ProfileError> {
        let username = raw.trim();
        let invalid = |reason: String| ProfileError::UsernameInvalidFormat {
            username: username.to_string(),
            reason,
        };

        let length = username.chars().count();
        if length < self.min_len || length > self.max_len {
            return Err(invalid(format!(
                "must be between {} and {} characters",
                self.min_len, self.max_len
            )));
        }
        if let Some(bad) = username
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(invalid(format!("'{bad}' is not allowed")));
        }
        Ok(username.to_string())
    }
}

impl Default for UsernamePolicy {
    fn default() -> Self {
        Self::from_config(&OnboardingConfig::default())
    }
}

/// Availability lookup issued by [`UsernameAvailability::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameTicket {
    pub generation: u64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CheckState {
    Empty,
    Invalid(ProfileError),
    Debouncing { since: DateTime<Utc> },
    Waiting,
    Resolved { available: bool },
}

/// Keystroke-driven availability state for the profile form.
///
/// Each edit starts a new generation. A lookup is dispatched once the text has been still
/// for the debounce window and no other lookup is outstanding; answers for an older
/// generation are discarded. The form may only advance on a resolved `available` answer
/// for the exact current text.
#[derive(Debug, Clone)]
pub struct UsernameAvailability {
    policy: UsernamePolicy,
    debounce: Duration,
    text: String,
    generation: u64,
    in_flight: Option<u64>,
    state: CheckState,
}

impl UsernameAvailability {
    pub fn new(policy: UsernamePolicy, debounce_ms: u64) -> Self {
        let debounce_ms = i64::try_from(debounce_ms).unwrap_or(i64::MAX);
        Self {
            policy,
            debounce: Duration::milliseconds(debounce_ms),
            text: String::new(),
            generation: 0,
            in_flight: None,
            state: CheckState::Empty,
        }
    }

    pub fn from_config(config: &OnboardingConfig) -> Self {
        Self::new(
            UsernamePolicy::from_config(config),
            config.username_debounce_ms,
        )
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Record a keystroke.
    pub fn edit(&mut self, text: &str, now: DateTime<Utc>) {
        self.generation += 1;
        self.text = text.trim().to_string();
        self.state = if self.text.is_empty() {
            CheckState::Empty
        } else {
            match self.policy.validate(&self.text) {
                Ok(_) => CheckState::Debouncing { since: now },
                Err(error) => CheckState::Invalid(error),
            }
        };
    }

    /// Dispatch a lookup if the debounce window has elapsed and nothing is in flight.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<UsernameTicket> {
        let CheckState::Debouncing { since } = self.state else {
            return None;
        };
        if self.in_flight.is_some() || now - since < self.debounce {
            return None;
        }
        self.in_flight = Some(self.generation);
        self.state = CheckState::Waiting;
        Some(UsernameTicket {
            generation: self.generation,
            username: self.text.clone(),
        })
    }

    /// Apply a lookup answer. Returns `false` when the answer was for superseded text.
    pub fn resolve(&mut self, ticket: &UsernameTicket, available: bool) -> bool {
        if self.in_flight == Some(ticket.generation) {
            self.in_flight = None;
        }
        if ticket.generation != self.generation || ticket.username != self.text {
            return false;
        }
        self.state = CheckState::Resolved { available };
        true
    }

    /// A failed lookup leaves the text unconfirmed; the next poll retries it.
    pub fn fail(&mut self, ticket: &UsernameTicket, now: DateTime<Utc>) {
        if self.in_flight == Some(ticket.generation) {
            self.in_flight = None;
        }
        if ticket.generation == self.generation {
            self.state = CheckState::Debouncing { since: now };
        }
    }

    pub fn is_checking(&self) -> bool {
        matches!(
            self.state,
            CheckState::Debouncing { .. } | CheckState::Waiting
        )
    }

    pub fn can_advance(&self) -> bool {
        self.ready().is_ok()
    }

    /// The confirmed username, or why the form must not advance yet.
    pub fn ready(&self) -> Result<&str, ProfileError> {
        match &self.state {
            CheckState::Resolved { available: true } => Ok(&self.text),
            CheckState::Resolved { available: false } => {
                Err(ProfileError::UsernameTaken(self.text.clone()))
            }
            CheckState::Invalid(error) => Err(error.clone()),
            CheckState::Debouncing { .. } | CheckState::Waiting => {
                Err(ProfileError::UsernameCheckPending)
            }
            CheckState::Empty => Err(ProfileError::UsernameInvalidFormat {
                username: String::new(),
                reason: "username is required".to_string(),
            }),
        }
    }
}
