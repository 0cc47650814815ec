use chrono::Duration;

use super::common::*;
use crate::workflows::onboarding::domain::{Answer, FieldError, SponsorProfilePatch, VotingMember};
use crate::workflows::onboarding::gate::OnboardingStage;
use crate::workflows::onboarding::orchestrator::{
    IdentityResume, IdentityResumeRequest, ProfileError, SubmitIntent, UsernameAvailability,
    UsernamePolicy,
};
use crate::workflows::onboarding::providers::IdentityOutcome;
use crate::workflows::onboarding::service::OnboardingError;
use crate::workflows::onboarding::status::{IdentityStatus, SubmissionStatus};
use crate::workflows::onboarding::store::{SubmissionStore, UpsertOutcome};

#[test]
fn identity_session_moves_subject_to_pending() {
    let harness = harness();
    harness.store.ensure_subject(&investor(), at(0)).expect("subject");
    let orchestrator = harness.service.orchestrator();

    let view = orchestrator
        .start_identity_check(&investor(), at(1))
        .expect("session started");

    assert_eq!(view.session.session_id, "sess-1");
    assert_eq!(view.onboarding.snapshot.identity_status, IdentityStatus::Pending);
    assert_eq!(view.onboarding.decision.stage, OnboardingStage::Identity);
    assert!(view.onboarding.decision.blocking.is_some());
}

#[test]
fn approved_identity_prefills_profile_and_opens_profile_stage() {
    let harness = harness();
    harness.store.ensure_subject(&investor(), at(0)).expect("subject");
    let orchestrator = harness.service.orchestrator();
    let session = orchestrator
        .start_identity_check(&investor(), at(1))
        .expect("session started")
        .session;
    harness
        .identity
        .resolve(&session.session_id, IdentityOutcome::Approved);

    let view = orchestrator
        .resume_after_identity_check(
            &investor(),
            IdentityResume::Completed {
                session_id: session.session_id,
            },
            at(2),
        )
        .expect("resumed");

    assert_eq!(view.snapshot.identity_status, IdentityStatus::Approved);
    assert_eq!(view.snapshot.profile.first_name, Answer::Provided("Jane".to_string()));
    assert_eq!(view.decision.stage, OnboardingStage::Profile);
}

#[test]
fn exiting_the_identity_flow_changes_nothing() {
    let harness = harness();
    harness.store.ensure_subject(&investor(), at(0)).expect("subject");
    let before = harness.store.snapshot(&investor()).expect("snapshot");

    let resume = IdentityResume::from(IdentityResumeRequest {
        session_id: Some("sess-1".to_string()),
        exited: true,
    });
    assert_eq!(resume, IdentityResume::Exited);

    let view = harness
        .service
        .orchestrator()
        .resume_after_identity_check(&investor(), resume, at(1))
        .expect("resumed");
    assert_eq!(view.snapshot.revision, before.revision);
    assert_eq!(view.snapshot.identity_status, IdentityStatus::NotStarted);
}

#[test]
fn provider_outage_leaves_identity_pending() {
    let harness = harness();
    harness.store.ensure_subject(&investor(), at(0)).expect("subject");
    let orchestrator = harness.service.orchestrator();
    orchestrator
        .start_identity_check(&investor(), at(1))
        .expect("session started");
    harness.identity.go_offline();

    let err = orchestrator
        .resume_after_identity_check(
            &investor(),
            IdentityResume::Completed {
                session_id: "sess-1".to_string(),
            },
            at(2),
        )
        .expect_err("provider offline");
    assert!(matches!(err, OnboardingError::Provider(_)));
    assert_eq!(
        harness.store.snapshot(&investor()).expect("snapshot").identity_status,
        IdentityStatus::Pending
    );
}

#[test]
fn rejected_identity_can_be_reset_and_retried() {
    let harness = harness();
    harness.store.ensure_subject(&investor(), at(0)).expect("subject");
    let orchestrator = harness.service.orchestrator();

    orchestrator
        .start_identity_check(&investor(), at(1))
        .expect("first attempt");
    let err = orchestrator
        .reset_identity(&investor(), at(2))
        .expect_err("pending attempts cannot be reset");
    assert!(matches!(err, OnboardingError::Transition(_)));

    harness.identity.resolve("sess-1", IdentityOutcome::Rejected);
    let view = orchestrator
        .resume_after_identity_check(
            &investor(),
            IdentityResume::Completed {
                session_id: "sess-1".to_string(),
            },
            at(3),
        )
        .expect("resumed");
    assert_eq!(view.snapshot.identity_status, IdentityStatus::Rejected);

    let view = orchestrator.reset_identity(&investor(), at(4)).expect("reset");
    assert_eq!(view.snapshot.identity_status, IdentityStatus::NotStarted);
    let retry = orchestrator
        .start_identity_check(&investor(), at(5))
        .expect("second attempt");
    assert_eq!(retry.session.session_id, "sess-2");
}

#[test]
fn profile_requires_approved_identity() {
    let harness = harness();
    harness.store.ensure_subject(&investor(), at(0)).expect("subject");

    let err = harness
        .service
        .orchestrator()
        .submit_profile(&investor(), profile("jane_doe"), at(1))
        .expect_err("identity not approved");
    match err {
        OnboardingError::AccessDenied(redirect) => {
            assert_eq!(redirect.stage, Some(OnboardingStage::Identity));
        }
        other => panic!("expected access denied, got {other:?}"),
    }
}

#[test]
fn profile_rejects_taken_and_malformed_usernames() {
    let harness = harness();
    onboarded(&harness.store, &sponsor(), "jane_doe");
    onboarded(&harness.store, &investor(), "someone_else");
    let orchestrator = harness.service.orchestrator();

    let err = orchestrator
        .submit_profile(&investor(), profile("Jane_Doe"), at(5))
        .expect_err("taken");
    assert!(matches!(
        err,
        OnboardingError::Profile(ProfileError::UsernameTaken(_))
    ));

    let err = orchestrator
        .submit_profile(&investor(), profile("jane doe!"), at(6))
        .expect_err("malformed");
    assert!(matches!(
        err,
        OnboardingError::Profile(ProfileError::UsernameInvalidFormat { .. })
    ));

    assert!(!orchestrator
        .check_username(&investor(), " jane_doe ")
        .expect("lookup"));
    assert!(orchestrator
        .check_username(&investor(), "someone_else")
        .expect("own username"));
}

#[test]
fn another_subjects_session_cannot_approve_identity() {
    let harness = harness();
    harness.store.ensure_subject(&investor(), at(0)).expect("subject");
    harness.store.ensure_subject(&sponsor(), at(0)).expect("subject");
    let orchestrator = harness.service.orchestrator();
    let foreign = orchestrator
        .start_identity_check(&sponsor(), at(1))
        .expect("sponsor session")
        .session
        .session_id;
    harness.identity.resolve(&foreign, IdentityOutcome::Approved);

    let err = orchestrator
        .resume_after_identity_check(
            &investor(),
            IdentityResume::Completed {
                session_id: foreign.clone(),
            },
            at(2),
        )
        .expect_err("no open session");
    assert!(matches!(err, OnboardingError::Transition(_)));
    assert_eq!(
        harness.store.snapshot(&investor()).expect("snapshot").identity_status,
        IdentityStatus::NotStarted
    );

    orchestrator
        .start_identity_check(&investor(), at(3))
        .expect("investor session");
    let err = orchestrator
        .resume_after_identity_check(
            &investor(),
            IdentityResume::Completed { session_id: foreign },
            at(4),
        )
        .expect_err("session belongs to the sponsor");
    match err {
        OnboardingError::Field(FieldError::Invalid { field, .. }) => {
            assert_eq!(field, "session_id")
        }
        other => panic!("expected session field error, got {other:?}"),
    }
    let snapshot = harness.store.snapshot(&investor()).expect("snapshot");
    assert_eq!(snapshot.identity_status, IdentityStatus::Pending);
    assert_eq!(snapshot.profile.first_name, Answer::NotProvided);
}

#[test]
fn questionnaire_before_profile_redirects_to_profile() {
    let harness = harness();
    harness.store.ensure_subject(&investor(), at(0)).expect("subject");
    harness
        .service
        .orchestrator()
        .start_identity_check(&investor(), at(1))
        .expect("session");
    harness.identity.resolve("sess-1", IdentityOutcome::Approved);
    harness
        .service
        .orchestrator()
        .resume_after_identity_check(
            &investor(),
            IdentityResume::Completed {
                session_id: "sess-1".to_string(),
            },
            at(2),
        )
        .expect("approved");

    let err = harness
        .service
        .orchestrator()
        .submit_questionnaire(
            &investor(),
            questionnaire_request(SubmitIntent::Continue),
            at(3),
        )
        .expect_err("profile incomplete");
    match err {
        OnboardingError::AccessDenied(redirect) => {
            assert_eq!(redirect.stage, Some(OnboardingStage::Profile));
        }
        other => panic!("expected access denied, got {other:?}"),
    }
}

#[test]
fn finishing_after_questionnaire_skips_sponsor_stage() {
    let harness = harness();
    onboarded(&harness.store, &investor(), "jane_doe");

    let view = harness
        .service
        .orchestrator()
        .submit_questionnaire(&investor(), questionnaire_request(SubmitIntent::Finish), at(5))
        .expect("submitted");

    assert_eq!(view.outcome, UpsertOutcome::Created);
    assert_eq!(view.record.status, SubmissionStatus::Pending);
    assert_eq!(view.onboarding.decision.stage, OnboardingStage::Completed);
    assert!(view.onboarding.decision.capabilities.can_invest);

    let deep_link = harness
        .service
        .orchestrator()
        .enter(&investor(), Some(OnboardingStage::SponsorKyb))
        .expect("deep link");
    assert_eq!(deep_link.decision.stage, OnboardingStage::SponsorKyb);
}

#[test]
fn continuing_after_questionnaire_leads_to_sponsor_stage() {
    let harness = harness();
    onboarded(&harness.store, &investor(), "jane_doe");
    let orchestrator = harness.service.orchestrator();

    let first = orchestrator
        .submit_questionnaire(&investor(), questionnaire_request(SubmitIntent::Continue), at(5))
        .expect("submitted");
    assert_eq!(first.onboarding.decision.stage, OnboardingStage::SponsorKyb);

    let again = orchestrator
        .submit_questionnaire(&investor(), questionnaire_request(SubmitIntent::Continue), at(6))
        .expect("resubmitted");
    assert_eq!(again.outcome, UpsertOutcome::Amended);
    assert_eq!(again.record.id, first.record.id);
    assert_eq!(
        harness.store.questionnaire_count(&investor()).expect("count"),
        1
    );
}

#[test]
fn stale_questionnaire_submission_asks_for_refetch() {
    let harness = harness();
    onboarded(&harness.store, &investor(), "jane_doe");
    let mut request = questionnaire_request(SubmitIntent::Continue);
    request.expected_revision = Some(0);

    let err = harness
        .service
        .orchestrator()
        .submit_questionnaire(&investor(), request, at(5))
        .expect_err("stale");
    assert!(matches!(err, OnboardingError::StaleSnapshot(_)));
    assert_eq!(
        harness.store.questionnaire_count(&investor()).expect("count"),
        0
    );
}

#[test]
fn incomplete_kyb_reports_the_missing_field() {
    let harness = harness();
    onboarded(&harness.store, &sponsor(), "maple_ridge");
    let mut request = kyb_request();
    request.submission.tax_id = Answer::NotProvided;

    let err = harness
        .service
        .orchestrator()
        .submit_sponsor_kyb(&sponsor(), request, at(5))
        .expect_err("tax id missing");
    assert!(matches!(
        err,
        OnboardingError::Field(FieldError::Missing { field: "tax_id" })
    ));
}

#[test]
fn sponsor_patch_keeps_status_and_checks_members() {
    let harness = harness();
    onboarded(&harness.store, &sponsor(), "maple_ridge");
    let orchestrator = harness.service.orchestrator();
    let submitted = orchestrator
        .submit_sponsor_kyb(&sponsor(), kyb_request(), at(5))
        .expect("kyb submitted");
    assert_eq!(submitted.record.status, SubmissionStatus::Pending);

    let with_member = |id| SponsorProfilePatch {
        voting_members: Some(vec![VotingMember {
            subject_id: id,
            display_name: Answer::Provided("Pat Member".to_string()),
        }]),
        ..Default::default()
    };

    let err = orchestrator
        .update_sponsor_profile(&sponsor(), with_member(member()), at(6))
        .expect_err("member has no account");
    assert!(matches!(
        err,
        OnboardingError::Field(FieldError::Invalid {
            field: "voting_members",
            ..
        })
    ));

    harness.store.ensure_subject(&member(), at(7)).expect("member");
    let mut patch = with_member(member());
    patch.bio = Answer::Provided("Now with co-authors.".to_string());
    let updated = orchestrator
        .update_sponsor_profile(&sponsor(), patch, at(8))
        .expect("patched");
    assert_eq!(updated.status, SubmissionStatus::Pending);
    assert_eq!(updated.presentation.voting_members.len(), 1);
    assert_eq!(
        updated.presentation.bio,
        Answer::Provided("Now with co-authors.".to_string())
    );
}

#[test]
fn username_checks_debounce_and_discard_stale_answers() {
    let mut check = UsernameAvailability::new(UsernamePolicy::default(), 400);
    check.edit("jane", at(0));
    assert!(check.poll(at(0)).is_none());

    let stale = check
        .poll(at(0) + Duration::milliseconds(450))
        .expect("debounce elapsed");
    check.edit("jane_doe", at(1));
    assert!(!check.resolve(&stale, true));
    assert!(!check.can_advance());

    let current = check
        .poll(at(1) + Duration::milliseconds(400))
        .expect("debounce elapsed");
    assert_eq!(current.username, "jane_doe");
    assert!(check.resolve(&current, true));
    assert_eq!(check.ready(), Ok("jane_doe"));
}
