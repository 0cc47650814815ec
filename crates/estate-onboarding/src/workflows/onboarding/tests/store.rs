use std::thread;

use super::common::*;
use crate::workflows::onboarding::domain::{
    Answer, AuthorRole, Notification, ProfileFields, QuestionnaireAnswers, RiskTolerance,
    SponsorProfilePatch, VotingMember,
};
use crate::workflows::onboarding::status::{
    EntityStatus, EntityType, IdentityStatus, SubmissionStatus,
};
use crate::workflows::onboarding::store::{
    IdentityUpdate, InMemorySubmissionStore, NewComment, ReviewCommit, StoreError,
    SubmissionStore, UpsertOutcome,
};

fn answers() -> QuestionnaireAnswers {
    questionnaire().validate().expect("valid questionnaire")
}

#[test]
fn ensure_subject_is_idempotent() {
    let store = InMemorySubmissionStore::new();
    let first = store.ensure_subject(&investor(), at(0)).expect("created");
    let second = store.ensure_subject(&investor(), at(30)).expect("existing");

    assert_eq!(first, second);
    assert_eq!(second.created_at, at(0));
}

#[test]
fn usernames_are_unique_ignoring_case() {
    let store = InMemorySubmissionStore::new();
    onboarded(&store, &investor(), "Jane_Doe");
    store.ensure_subject(&sponsor(), at(0)).expect("created");

    assert!(!store
        .username_available("jane_doe", &sponsor())
        .expect("lookup"));
    assert!(store
        .username_available("JANE_DOE", &investor())
        .expect("own name is available"));

    let err = store
        .update_profile(
            &sponsor(),
            ProfileFields {
                username: Answer::Provided("JANE_doe".to_string()),
                ..Default::default()
            },
            None,
            at(5),
        )
        .expect_err("username already claimed");
    assert!(matches!(err, StoreError::UsernameTaken(name) if name == "JANE_doe"));
}

#[test]
fn stale_revision_is_rejected_without_writing() {
    let store = InMemorySubmissionStore::new();
    onboarded(&store, &investor(), "jane_doe");
    let revision = store.snapshot(&investor()).expect("snapshot").revision;

    store
        .upsert_questionnaire(&investor(), answers(), false, Some(revision), at(10))
        .expect("fresh revision accepted");

    let err = store
        .upsert_questionnaire(&investor(), answers(), false, Some(revision), at(11))
        .expect_err("revision moved on");
    match err {
        StoreError::StaleRevision { expected, current } => {
            assert_eq!(expected, revision);
            assert_eq!(current, revision + 1);
        }
        other => panic!("expected stale revision, got {other:?}"),
    }
}

#[test]
fn questionnaire_is_updated_in_place() {
    let store = InMemorySubmissionStore::new();
    onboarded(&store, &investor(), "jane_doe");

    let (first, outcome) = store
        .upsert_questionnaire(&investor(), answers(), false, None, at(10))
        .expect("created");
    assert_eq!(outcome, UpsertOutcome::Created);
    assert_eq!(first.status, SubmissionStatus::Pending);

    let (second, outcome) = store
        .upsert_questionnaire(&investor(), answers(), false, None, at(11))
        .expect("amended");
    assert_eq!(outcome, UpsertOutcome::Amended);
    assert_eq!(second.id, first.id);
    assert_eq!(store.questionnaire_count(&investor()).expect("count"), 1);
}

#[test]
fn finishing_records_the_sponsor_skip_with_the_questionnaire() {
    let store = InMemorySubmissionStore::new();
    onboarded(&store, &investor(), "jane_doe");
    let before = store.snapshot(&investor()).expect("snapshot").revision;

    store
        .upsert_questionnaire(&investor(), answers(), true, Some(before), at(10))
        .expect("stored");

    let snapshot = store.snapshot(&investor()).expect("snapshot");
    assert!(snapshot.sponsor_skipped);
    assert_eq!(snapshot.revision, before + 1);

    let err = store
        .upsert_questionnaire(&investor(), answers(), true, Some(before), at(11))
        .expect_err("revision moved on");
    assert!(matches!(err, StoreError::StaleRevision { .. }));
}

#[test]
fn concurrent_first_submissions_keep_one_whole_questionnaire() {
    let store = InMemorySubmissionStore::new();
    onboarded(&store, &investor(), "jane_doe");
    let cautious = QuestionnaireAnswers {
        risk_tolerance: RiskTolerance::Conservative,
        liquid_net_worth_usd: 1_100_000,
        ..answers()
    };
    let bold = QuestionnaireAnswers {
        risk_tolerance: RiskTolerance::Aggressive,
        liquid_net_worth_usd: 4_000_000,
        ..answers()
    };

    let outcomes: Vec<UpsertOutcome> = thread::scope(|scope| {
        let writers: Vec<_> = [cautious.clone(), bold.clone()]
            .into_iter()
            .map(|answers| {
                let store = &store;
                scope.spawn(move || {
                    store
                        .upsert_questionnaire(&investor(), answers, false, None, at(10))
                        .expect("stored")
                        .1
                })
            })
            .collect();
        writers
            .into_iter()
            .map(|writer| writer.join().expect("writer thread"))
            .collect()
    });

    assert_eq!(store.questionnaire_count(&investor()).expect("count"), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| **outcome == UpsertOutcome::Created)
            .count(),
        1
    );
    let stored = store
        .snapshot(&investor())
        .expect("snapshot")
        .questionnaire
        .expect("questionnaire")
        .answers;
    assert!(stored == cautious || stored == bold);
}

#[test]
fn identity_approval_prefills_only_missing_fields() {
    let store = InMemorySubmissionStore::new();
    store.ensure_subject(&investor(), at(0)).expect("created");
    store
        .update_profile(
            &investor(),
            ProfileFields {
                first_name: Answer::Provided("Janet".to_string()),
                ..Default::default()
            },
            None,
            at(1),
        )
        .expect("profile stored");

    let record = store
        .advance_identity(
            &investor(),
            IdentityUpdate {
                target: IdentityStatus::Approved,
                session_id: Some("sess-9".to_string()),
                prefill: ProfileFields {
                    first_name: Answer::Provided("Jane".to_string()),
                    last_name: Answer::Provided("Doe".to_string()),
                    ..Default::default()
                },
                verdict: false,
            },
            at(2),
        )
        .expect("approved through pending");

    assert_eq!(record.status, IdentityStatus::Approved);
    let profile = store.snapshot(&investor()).expect("snapshot").profile;
    assert_eq!(profile.first_name, Answer::Provided("Janet".to_string()));
    assert_eq!(profile.last_name, Answer::Provided("Doe".to_string()));
    assert_eq!(profile.phone, Answer::NotProvided);
}

#[test]
fn review_commit_detects_concurrent_change() {
    let store = InMemorySubmissionStore::new();
    onboarded(&store, &investor(), "jane_doe");
    let (record, _) = store
        .upsert_questionnaire(&investor(), answers(), false, None, at(10))
        .expect("created");

    let mut target = store
        .review_target(EntityType::Investor, &record.id.0)
        .expect("target");
    target.status = EntityStatus::Submission(SubmissionStatus::ActionRequired);

    let err = store
        .commit_review(ReviewCommit {
            next: EntityStatus::Submission(SubmissionStatus::Verified),
            comment: Some(NewComment {
                entity_type: EntityType::Investor,
                entity_id: record.id.0.clone(),
                subject_id: investor(),
                author: admin(),
                author_role: AuthorRole::Admin,
                content: "Looks good".to_string(),
                internal: false,
            }),
            notification: Notification {
                subject_id: investor(),
                title: "Investor profile approved".to_string(),
                message: "Looks good".to_string(),
                link: None,
                created_at: at(20),
            },
            target,
            at: at(20),
        })
        .expect_err("status moved underneath the reviewer");

    assert!(matches!(err, StoreError::StatusChanged { .. }));
    assert!(store
        .comments(EntityType::Investor, &record.id.0, true)
        .expect("comments")
        .is_empty());
    assert_eq!(store.pending_notifications().expect("outbox"), 0);
    let snapshot = store.snapshot(&investor()).expect("snapshot");
    assert_eq!(
        snapshot.questionnaire.map(|q| q.status),
        Some(SubmissionStatus::Pending)
    );
}

#[test]
fn review_queue_defaults_to_pending_items_oldest_first() {
    let store = InMemorySubmissionStore::new();
    onboarded(&store, &investor(), "jane_doe");
    onboarded(&store, &sponsor(), "maple_ridge");

    let (details, presentation) = kyb().validate().expect("valid kyb");
    store
        .upsert_sponsor(&sponsor(), details, presentation, None, at(30))
        .expect("sponsor stored");
    store
        .upsert_questionnaire(&investor(), answers(), false, None, at(40))
        .expect("questionnaire stored");

    let queue = store.review_queue(false).expect("queue");
    let kinds: Vec<EntityType> = queue.iter().map(|row| row.entity_type).collect();
    assert_eq!(kinds, vec![EntityType::Sponsor, EntityType::Investor]);

    let everything = store.review_queue(true).expect("queue");
    assert_eq!(
        everything
            .iter()
            .filter(|row| row.entity_type == EntityType::Kyc)
            .count(),
        2
    );
}

#[test]
fn deleting_a_subject_cascades() {
    let harness = harness();
    verified_sponsor(&harness, &sponsor());
    onboarded(&harness.store, &member(), "member_one");
    harness
        .store
        .patch_sponsor(
            &sponsor(),
            SponsorProfilePatch {
                voting_members: Some(vec![VotingMember {
                    subject_id: member(),
                    display_name: Answer::NotProvided,
                }]),
                ..Default::default()
            },
            at(5),
        )
        .expect("member added");
    let listing = harness
        .store
        .insert_listing(
            &sponsor(),
            listing_draft().validate().expect("valid draft"),
            at(6),
        )
        .expect("listing stored");

    harness.store.delete_subject(&member()).expect("member deleted");
    let sponsor_snapshot = harness.store.snapshot(&sponsor()).expect("snapshot");
    let members = sponsor_snapshot
        .sponsor
        .expect("sponsor profile")
        .presentation
        .voting_members;
    assert!(members.is_empty());

    harness.store.delete_subject(&sponsor()).expect("sponsor deleted");
    assert!(harness.store.listing(&listing.id).expect("lookup").is_none());
    assert!(matches!(
        harness.store.snapshot(&sponsor()),
        Err(StoreError::NotFound)
    ));
    assert!(harness
        .store
        .review_queue(true)
        .expect("queue")
        .iter()
        .all(|row| row.subject_id != sponsor()));
}

#[test]
fn comment_ids_are_not_reused_after_a_subject_is_deleted() {
    let store = InMemorySubmissionStore::new();
    onboarded(&store, &investor(), "jane_doe");
    onboarded(&store, &sponsor(), "maple_ridge");
    let (questionnaire, _) = store
        .upsert_questionnaire(&investor(), answers(), false, None, at(10))
        .expect("questionnaire stored");
    let (details, presentation) = kyb().validate().expect("valid kyb");
    let (profile, _) = store
        .upsert_sponsor(&sponsor(), details, presentation, None, at(11))
        .expect("sponsor stored");
    let note = |entity_type, entity_id: &str, subject_id| NewComment {
        entity_type,
        entity_id: entity_id.to_string(),
        subject_id,
        author: admin(),
        author_role: AuthorRole::Admin,
        content: "Checked".to_string(),
        internal: true,
    };

    let first = store
        .append_comment(note(EntityType::Investor, &questionnaire.id.0, investor()), at(12))
        .expect("comment stored");
    let second = store
        .append_comment(note(EntityType::Sponsor, &profile.id.0, sponsor()), at(13))
        .expect("comment stored");
    store.delete_subject(&investor()).expect("investor deleted");
    let third = store
        .append_comment(note(EntityType::Sponsor, &profile.id.0, sponsor()), at(14))
        .expect("comment stored");

    assert!(third.id > second.id && second.id > first.id);
    let ids: Vec<u64> = store
        .comments(EntityType::Sponsor, &profile.id.0, true)
        .expect("comments")
        .iter()
        .map(|comment| comment.id)
        .collect();
    assert_eq!(ids, vec![second.id, third.id]);
}
