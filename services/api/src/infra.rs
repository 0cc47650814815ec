use estate_onboarding::config::AuthConfig;
use estate_onboarding::workflows::onboarding::{
    AuthProvider, IdentityCheck, IdentityOutcome, IdentitySession, IdentityVerificationProvider,
    Notification, NotificationSink, Principal, ProviderError, SubjectId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Bearer tokens configured through `APP_AUTH_TOKENS`.
#[derive(Debug, Default, Clone)]
pub(crate) struct StaticTokenAuth {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuth {
    pub(crate) fn from_config(config: &AuthConfig) -> Self {
        let tokens = config
            .static_tokens
            .iter()
            .map(|entry| {
                let principal = Principal {
                    subject_id: SubjectId(entry.subject_id.clone()),
                    admin: entry.admin,
                };
                (entry.token.clone(), principal)
            })
            .collect();
        Self { tokens }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl AuthProvider for StaticTokenAuth {
    fn authenticate(&self, bearer_token: &str) -> Option<Principal> {
        self.tokens.get(bearer_token).cloned()
    }
}

/// Identity vendor stand-in that approves every session it issued.
#[derive(Default)]
pub(crate) struct SandboxIdentityProvider {
    sequence: AtomicU64,
    issued: Mutex<HashSet<String>>,
}

impl IdentityVerificationProvider for SandboxIdentityProvider {
    fn create_session(&self, subject: &SubjectId) -> Result<IdentitySession, ProviderError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let session_id = format!("sandbox-{id:06}");
        self.issued
            .lock()
            .map_err(|_| ProviderError::Identity("sandbox state poisoned".to_string()))?
            .insert(session_id.clone());
        info!(%subject, %session_id, "sandbox identity session issued");
        Ok(IdentitySession {
            session_token: format!("sandbox-token-{subject}-{id}"),
            session_id,
        })
    }

    fn check_status(&self, session_id: &str) -> Result<IdentityCheck, ProviderError> {
        let issued = self
            .issued
            .lock()
            .map_err(|_| ProviderError::Identity("sandbox state poisoned".to_string()))?;
        let outcome = if issued.contains(session_id) {
            IdentityOutcome::Approved
        } else {
            IdentityOutcome::Rejected
        };
        Ok(IdentityCheck {
            outcome,
            first_name: None,
            last_name: None,
            phone: None,
        })
    }
}

/// Delivers notifications to the log and keeps them for inspection.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationSink {
    delivered: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationSink for LoggingNotificationSink {
    fn notify(&self, notification: &Notification) -> Result<(), ProviderError> {
        info!(
            subject = %notification.subject_id,
            title = %notification.title,
            link = notification.link.as_deref().unwrap_or(""),
            "notification delivered"
        );
        self.delivered
            .lock()
            .map_err(|_| ProviderError::Notification("sink state poisoned".to_string()))?
            .push(notification.clone());
        Ok(())
    }
}

impl LoggingNotificationSink {
    pub(crate) fn delivered(&self) -> Vec<Notification> {
        self.delivered
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use estate_onboarding::config::StaticToken;

    #[test]
    fn static_tokens_resolve_configured_principals() {
        let auth = StaticTokenAuth::from_config(&AuthConfig {
            static_tokens: vec![
                StaticToken {
                    token: "dev-admin".to_string(),
                    subject_id: "ops-1".to_string(),
                    admin: true,
                },
                StaticToken {
                    token: "dev-investor".to_string(),
                    subject_id: "investor-1".to_string(),
                    admin: false,
                },
            ],
        });

        assert!(!auth.is_empty());
        let admin = auth.authenticate("dev-admin").expect("admin token");
        assert!(admin.admin);
        assert_eq!(admin.subject_id, SubjectId("ops-1".to_string()));
        assert!(auth.authenticate("forged").is_none());
    }

    #[test]
    fn sandbox_approves_only_issued_sessions() {
        let provider = SandboxIdentityProvider::default();
        let session = provider
            .create_session(&SubjectId("investor-1".to_string()))
            .expect("session issued");

        let check = provider
            .check_status(&session.session_id)
            .expect("status available");
        assert_eq!(check.outcome, IdentityOutcome::Approved);
        let unknown = provider.check_status("made-up").expect("status available");
        assert_eq!(unknown.outcome, IdentityOutcome::Rejected);
    }
}
