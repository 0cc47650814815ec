use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::OnboardingConfig;
use crate::workflows::onboarding::domain::{
    AccreditationType, Answer, BusinessType, DocumentReference, ExperienceTier,
    InvestorClassification, KybSubmission, ListingDraft, Notification, PostalAddress,
    QuestionnaireSubmission, RiskTolerance, SubjectId, WalletAddress,
};
use crate::workflows::onboarding::orchestrator::{
    KybRequest, ProfileSubmission, QuestionnaireRequest, SubmitIntent,
};
use crate::workflows::onboarding::providers::{
    AuthProvider, IdentityCheck, IdentityOutcome, IdentitySession, IdentityVerificationProvider,
    NotificationSink, Principal, ProviderError,
};
use crate::workflows::onboarding::service::{Collaborators, OnboardingService};
use crate::workflows::onboarding::status::{EntityType, IdentityStatus};
use crate::workflows::onboarding::store::{
    IdentityUpdate, InMemorySubmissionStore, SubmissionStore,
};
use crate::workflows::onboarding::review::ReviewRequest;

pub(super) const INVESTOR_TOKEN: &str = "investor-token";
pub(super) const SPONSOR_TOKEN: &str = "sponsor-token";
pub(super) const MEMBER_TOKEN: &str = "member-token";
pub(super) const ADMIN_TOKEN: &str = "admin-token";

pub(super) fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
        + Duration::minutes(minutes)
}

pub(super) fn subject(id: &str) -> SubjectId {
    SubjectId(id.to_string())
}

pub(super) fn investor() -> SubjectId {
    subject("investor-1")
}

pub(super) fn sponsor() -> SubjectId {
    subject("sponsor-1")
}

pub(super) fn member() -> SubjectId {
    subject("member-1")
}

pub(super) fn admin() -> SubjectId {
    subject("admin-1")
}

pub(super) fn principal(id: SubjectId, admin: bool) -> Principal {
    Principal {
        subject_id: id,
        admin,
    }
}

pub(super) fn document(name: &str) -> DocumentReference {
    DocumentReference(format!("https://files.estate.test/uploads/{name}"))
}

pub(super) fn questionnaire() -> QuestionnaireSubmission {
    QuestionnaireSubmission {
        classification: Answer::Provided(InvestorClassification::Individual),
        experience: Answer::Provided(ExperienceTier::Moderate),
        risk_tolerance: Answer::Provided(RiskTolerance::Balanced),
        liquid_net_worth_usd: Answer::Provided(1_250_000),
        tax_country: Answer::Provided("us".to_string()),
        accreditation: Answer::Provided(AccreditationType::NetWorth),
        verification_method: Answer::NotProvided,
        documents: vec![document("net-worth-statement.pdf")],
    }
}

pub(super) fn questionnaire_request(intent: SubmitIntent) -> QuestionnaireRequest {
    QuestionnaireRequest {
        answers: questionnaire(),
        intent,
        expected_revision: None,
    }
}

pub(super) fn kyb() -> KybSubmission {
    KybSubmission {
        business_legal_name: Answer::Provided("Maple Ridge Holdings LLC".to_string()),
        business_type: Answer::Provided(BusinessType::LimitedLiabilityCompany),
        tax_id: Answer::Provided("84-1234567".to_string()),
        address: Answer::Provided(PostalAddress {
            line1: "400 Locust St".to_string(),
            line2: Answer::Provided("Suite 200".to_string()),
            city: "Des Moines".to_string(),
            region: "IA".to_string(),
            postal_code: "50309".to_string(),
            country: "US".to_string(),
        }),
        bio: Answer::Provided("Midwest multifamily operator.".to_string()),
        wallet_address: Answer::Provided(WalletAddress(format!("0x{}", "ab".repeat(20)))),
        documents: vec![document("articles-of-organization.pdf")],
    }
}

pub(super) fn kyb_request() -> KybRequest {
    KybRequest {
        submission: kyb(),
        expected_revision: None,
    }
}

pub(super) fn listing_draft() -> ListingDraft {
    ListingDraft {
        title: Answer::Provided("Ingersoll Fourplex".to_string()),
        property_address: Answer::Provided("3120 Ingersoll Ave, Des Moines, IA".to_string()),
        description: Answer::Provided("Renovated fourplex near Drake.".to_string()),
        target_raise_usd: Answer::Provided(850_000),
        minimum_investment_usd: Answer::Provided(1_000),
        documents: vec![document("appraisal.pdf")],
    }
}

pub(super) fn profile(username: &str) -> ProfileSubmission {
    ProfileSubmission {
        username: username.to_string(),
        first_name: Answer::Provided("Jane".to_string()),
        last_name: Answer::Provided("Doe".to_string()),
        phone: Answer::Provided("+15155550100".to_string()),
        expected_revision: None,
    }
}

pub(super) fn review_request(action: &str, comment: Option<&str>) -> ReviewRequest {
    ReviewRequest {
        action: action.to_string(),
        comment: comment.map(str::to_string),
        new_status: None,
    }
}

/// Identity provider whose outcomes are scripted per session.
#[derive(Default)]
pub(super) struct ScriptedIdentity {
    sequence: AtomicU64,
    outcomes: Mutex<HashMap<String, IdentityCheck>>,
    offline: AtomicBool,
}

impl ScriptedIdentity {
    pub(super) fn resolve(&self, session_id: &str, outcome: IdentityOutcome) {
        self.outcomes.lock().expect("identity mutex poisoned").insert(
            session_id.to_string(),
            IdentityCheck {
                outcome,
                first_name: Some("Jane".to_string()),
                last_name: Some("Doe".to_string()),
                phone: None,
            },
        );
    }

    pub(super) fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

impl IdentityVerificationProvider for ScriptedIdentity {
    fn create_session(&self, subject: &SubjectId) -> Result<IdentitySession, ProviderError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ProviderError::Identity("vendor timeout".to_string()));
        }
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(IdentitySession {
            session_id: format!("sess-{id}"),
            session_token: format!("token-{subject}-{id}"),
        })
    }

    fn check_status(&self, session_id: &str) -> Result<IdentityCheck, ProviderError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ProviderError::Identity("vendor timeout".to_string()));
        }
        Ok(self
            .outcomes
            .lock()
            .expect("identity mutex poisoned")
            .get(session_id)
            .cloned()
            .unwrap_or(IdentityCheck {
                outcome: IdentityOutcome::Pending,
                first_name: None,
                last_name: None,
                phone: None,
            }))
    }
}

#[derive(Default)]
pub(super) struct RecordingSink {
    delivered: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub(super) fn delivered(&self) -> Vec<Notification> {
        self.delivered.lock().expect("sink mutex poisoned").clone()
    }

    pub(super) fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: &Notification) -> Result<(), ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Notification("smtp relay down".to_string()));
        }
        self.delivered
            .lock()
            .expect("sink mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}

pub(super) struct StaticTokens(HashMap<String, Principal>);

impl Default for StaticTokens {
    fn default() -> Self {
        let tokens = [
            (INVESTOR_TOKEN, principal(investor(), false)),
            (SPONSOR_TOKEN, principal(sponsor(), false)),
            (MEMBER_TOKEN, principal(member(), false)),
            (ADMIN_TOKEN, principal(admin(), true)),
        ];
        Self(
            tokens
                .into_iter()
                .map(|(token, principal)| (token.to_string(), principal))
                .collect(),
        )
    }
}

impl AuthProvider for StaticTokens {
    fn authenticate(&self, bearer_token: &str) -> Option<Principal> {
        self.0.get(bearer_token).cloned()
    }
}

pub(super) struct Harness {
    pub(super) service: Arc<OnboardingService<InMemorySubmissionStore>>,
    pub(super) store: Arc<InMemorySubmissionStore>,
    pub(super) identity: Arc<ScriptedIdentity>,
    pub(super) sink: Arc<RecordingSink>,
}

pub(super) fn harness() -> Harness {
    let store = Arc::new(InMemorySubmissionStore::new());
    let identity = Arc::new(ScriptedIdentity::default());
    let sink = Arc::new(RecordingSink::default());
    let collaborators = Collaborators {
        identity: identity.clone(),
        notifications: sink.clone(),
        auth: Arc::new(StaticTokens::default()),
    };
    let service = Arc::new(OnboardingService::new(
        store.clone(),
        collaborators,
        &OnboardingConfig::default(),
    ));
    Harness {
        service,
        store,
        identity,
        sink,
    }
}

/// Subject with identity approved and a username claimed, written straight to the store.
pub(super) fn onboarded(store: &InMemorySubmissionStore, id: &SubjectId, username: &str) {
    store.ensure_subject(id, at(0)).expect("subject created");
    store
        .advance_identity(
            id,
            IdentityUpdate {
                target: IdentityStatus::Approved,
                session_id: Some(format!("seed-{id}")),
                prefill: Default::default(),
                verdict: false,
            },
            at(1),
        )
        .expect("identity approved");
    let mut fields = store.snapshot(id).expect("snapshot").profile;
    fields.username = Answer::Provided(username.to_string());
    store
        .update_profile(id, fields, None, at(2))
        .expect("profile stored");
}

/// Onboarded subject whose sponsor profile has been verified by an admin.
pub(super) fn verified_sponsor(harness: &Harness, id: &SubjectId) {
    onboarded(&harness.store, id, "maple_ridge");
    let (details, presentation) = kyb().validate().expect("valid kyb");
    let (profile, _) = harness
        .store
        .upsert_sponsor(id, details, presentation, None, at(3))
        .expect("sponsor stored");
    harness
        .service
        .review_desk()
        .review(
            &admin(),
            EntityType::Sponsor,
            &profile.id.0,
            &review_request("APPROVE", None),
            at(4),
        )
        .expect("sponsor approved");
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
