use crate::infra::{LoggingNotificationSink, SandboxIdentityProvider, StaticTokenAuth};
use clap::Args;
use estate_onboarding::config::{AuthConfig, OnboardingConfig};
use estate_onboarding::error::AppError;
use estate_onboarding::workflows::onboarding::domain::{
    AccreditationType, Answer, BusinessType, DocumentReference, ExperienceTier,
    InvestorClassification, KybSubmission, ListingDraft, PostalAddress, QuestionnaireSubmission,
    RiskTolerance, WalletAddress,
};
use estate_onboarding::workflows::onboarding::{
    Collaborators, EntityType, IdentityResume, InMemorySubmissionStore, KybRequest,
    OnboardingError, OnboardingService, Principal, ProfileSubmission, QuestionnaireRequest,
    ReviewRequest, SubmitIntent, UpsertOutcome,
};
use std::sync::Arc;

const DEMO_TOKENS: &str =
    "demo-investor=investor-demo,demo-sponsor=sponsor-demo,demo-admin=ops-demo:admin";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Username claimed by the demo investor
    #[arg(long, default_value = "jane99")]
    pub(crate) username: String,
    /// Comment attached to the questionnaire rejection
    #[arg(long, default_value = "Net worth documentation insufficient")]
    pub(crate) rejection_comment: String,
    /// Skip the sponsor listing portion of the demo
    #[arg(long)]
    pub(crate) skip_listing: bool,
}

struct Demo {
    service: OnboardingService<InMemorySubmissionStore>,
    store: Arc<InMemorySubmissionStore>,
    sink: Arc<LoggingNotificationSink>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        username,
        rejection_comment,
        skip_listing,
    } = args;

    let auth = AuthConfig::parse(DEMO_TOKENS)?;
    let store = Arc::new(InMemorySubmissionStore::new());
    let sink = Arc::new(LoggingNotificationSink::default());
    let collaborators = Collaborators {
        identity: Arc::new(SandboxIdentityProvider::default()),
        notifications: sink.clone(),
        auth: Arc::new(StaticTokenAuth::from_config(&auth)),
    };
    let demo = Demo {
        service: OnboardingService::new(
            store.clone(),
            collaborators,
            &OnboardingConfig::default(),
        ),
        store,
        sink,
    };

    println!("Estate onboarding demo");
    let investor = demo.identity_and_profile("demo-investor", &username)?;
    let admin = demo.service.authenticate(Some("demo-admin"))?;
    demo.questionnaire_review(&investor, &admin, &rejection_comment)?;

    if !skip_listing {
        let sponsor = demo.identity_and_profile("demo-sponsor", "maple_ridge")?;
        demo.listing_lifecycle(&sponsor, &admin)?;
    }

    Ok(())
}

impl Demo {
    fn identity_and_profile(&self, token: &str, username: &str) -> Result<Principal, AppError> {
        let principal = self.service.authenticate(Some(token))?;
        println!("\nIdentity and profile ({})", principal.subject_id);

        let started = self.service.start_identity_session(&principal)?;
        println!(
            "- identity session {} opened, identity {}",
            started.session.session_id, started.onboarding.snapshot.identity_status
        );

        let resumed = self.service.resume_identity(
            &principal,
            IdentityResume::Completed {
                session_id: started.session.session_id,
            },
        )?;
        println!(
            "- identity {}, next stage {}",
            resumed.snapshot.identity_status, resumed.decision.stage
        );

        let available = self.service.check_username(&principal, username)?;
        println!("- username {username} available: {available}");

        let view = self.service.submit_profile(
            &principal,
            ProfileSubmission {
                username: username.to_string(),
                first_name: Answer::Provided("Jane".to_string()),
                last_name: Answer::Provided("Doe".to_string()),
                phone: Answer::Provided("+15155550100".to_string()),
                expected_revision: Some(resumed.snapshot.revision),
            },
        )?;
        println!("- profile saved, next stage {}", view.decision.stage);
        Ok(principal)
    }

    fn questionnaire_review(
        &self,
        investor: &Principal,
        admin: &Principal,
        comment: &str,
    ) -> Result<(), AppError> {
        println!("\nInvestor questionnaire review");
        let submitted = self.service.submit_questionnaire(investor, questionnaire())?;
        let id = submitted.record.id.0.clone();
        println!(
            "- questionnaire {id} {} ({})",
            outcome_label(submitted.outcome),
            submitted.record.status
        );

        let receipt = self.service.review(
            admin,
            EntityType::Investor,
            &id,
            &ReviewRequest {
                action: "REJECT".to_string(),
                comment: Some(comment.to_string()),
                new_status: None,
            },
        )?;
        let thread = self.service.comments(investor, EntityType::Investor, &id)?;
        println!(
            "- admin decision {} | {} comment(s) | {} notification(s) delivered",
            receipt.status,
            thread.len(),
            self.sink.delivered().len()
        );

        let resubmitted = self.service.submit_questionnaire(investor, questionnaire())?;
        let count = self
            .store
            .questionnaire_count(&investor.subject_id)
            .map_err(OnboardingError::from)?;
        println!(
            "- resubmitted: {} ({}), {count} questionnaire record(s)",
            outcome_label(resubmitted.outcome),
            resubmitted.record.status
        );
        Ok(())
    }

    fn listing_lifecycle(&self, sponsor: &Principal, admin: &Principal) -> Result<(), AppError> {
        println!("\nSponsor listing lifecycle");
        let submitted = self.service.submit_sponsor_kyb(sponsor, kyb())?;
        let approval = ReviewRequest {
            action: "APPROVE".to_string(),
            comment: None,
            new_status: None,
        };
        let receipt = self
            .service
            .review(admin, EntityType::Sponsor, &submitted.record.id.0, &approval)?;
        println!("- sponsor profile {} {}", submitted.record.id.0, receipt.status);

        let listing = self.service.create_listing(sponsor, listing_draft())?;
        println!("- listing {} created as {}", listing.id.0, listing.status);
        let listing = self.service.submit_listing(sponsor, &listing.id)?;
        println!("- listing submitted, now {}", listing.status);

        let tokenize = ReviewRequest {
            action: "TOKENIZE".to_string(),
            comment: None,
            new_status: None,
        };
        let receipt = self
            .service
            .review(admin, EntityType::Listing, &listing.id.0, &tokenize)?;
        println!("- admin decision {}", receipt.status);

        match self.service.withdraw_listing(sponsor, &listing.id) {
            Ok(listing) => println!("- withdraw unexpectedly accepted ({})", listing.status),
            Err(err) => println!("- withdraw refused: {err}"),
        }
        Ok(())
    }
}

fn outcome_label(outcome: UpsertOutcome) -> &'static str {
    match outcome {
        UpsertOutcome::Created => "created",
        UpsertOutcome::Resubmitted => "resubmitted",
        UpsertOutcome::Amended => "amended",
    }
}

fn document(name: &str) -> DocumentReference {
    DocumentReference(format!("https://files.estate.example/demo/{name}"))
}

fn questionnaire() -> QuestionnaireRequest {
    QuestionnaireRequest {
        answers: QuestionnaireSubmission {
            classification: Answer::Provided(InvestorClassification::Individual),
            experience: Answer::Provided(ExperienceTier::Moderate),
            risk_tolerance: Answer::Provided(RiskTolerance::Balanced),
            liquid_net_worth_usd: Answer::Provided(1_250_000),
            tax_country: Answer::Provided("US".to_string()),
            accreditation: Answer::Provided(AccreditationType::NetWorth),
            verification_method: Answer::NotProvided,
            documents: vec![document("net-worth-statement.pdf")],
        },
        intent: SubmitIntent::Continue,
        expected_revision: None,
    }
}

fn kyb() -> KybRequest {
    KybRequest {
        submission: KybSubmission {
            business_legal_name: Answer::Provided("Maple Ridge Holdings LLC".to_string()),
            business_type: Answer::Provided(BusinessType::LimitedLiabilityCompany),
            tax_id: Answer::Provided("84-1234567".to_string()),
            address: Answer::Provided(PostalAddress {
                line1: "400 Locust St".to_string(),
                line2: Answer::NotProvided,
                city: "Des Moines".to_string(),
                region: "IA".to_string(),
                postal_code: "50309".to_string(),
                country: "US".to_string(),
            }),
            bio: Answer::Provided("Midwest multifamily operator.".to_string()),
            wallet_address: Answer::Provided(WalletAddress(format!("0x{}", "4f".repeat(20)))),
            documents: vec![document("articles-of-organization.pdf")],
        },
        expected_revision: None,
    }
}

fn listing_draft() -> ListingDraft {
    ListingDraft {
        title: Answer::Provided("Ingersoll Fourplex".to_string()),
        property_address: Answer::Provided("3120 Ingersoll Ave, Des Moines, IA".to_string()),
        description: Answer::Provided("Renovated fourplex near Drake.".to_string()),
        target_raise_usd: Answer::Provided(850_000),
        minimum_investment_usd: Answer::Provided(1_000),
        documents: vec![document("appraisal.pdf")],
    }
}
