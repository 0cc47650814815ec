use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::domain::{FieldError, ListingDraft, ListingId, SponsorProfilePatch};
use super::guards::GuardedAction;
use super::orchestrator::{
    IdentityResumeRequest, KybRequest, ProfileSubmission, QuestionnaireRequest,
};
use super::review::{ReviewError, ReviewRequest};
use super::service::{OnboardingError, OnboardingService};
use super::status::{EntityType, TransitionError};
use super::store::{StoreError, SubmissionStore};

/// Router exposing the subject-facing onboarding API and the admin review API.
pub fn onboarding_router<S>(service: Arc<OnboardingService<S>>) -> Router
where
    S: SubmissionStore + 'static,
{
    Router::new()
        .route("/api/v1/onboarding/status", get(status_handler::<S>))
        .route("/api/v1/onboarding/profile", post(profile_handler::<S>))
        .route(
            "/api/v1/onboarding/questionnaire",
            post(questionnaire_handler::<S>).patch(questionnaire_handler::<S>),
        )
        .route(
            "/api/v1/onboarding/check-username",
            get(check_username_handler::<S>),
        )
        .route(
            "/api/v1/onboarding/identity/session",
            post(identity_session_handler::<S>),
        )
        .route(
            "/api/v1/onboarding/identity/resume",
            post(identity_resume_handler::<S>),
        )
        .route(
            "/api/v1/onboarding/identity/reset",
            post(identity_reset_handler::<S>),
        )
        .route(
            "/api/v1/onboarding/comments",
            get(comments_handler::<S>).post(reply_handler::<S>),
        )
        .route(
            "/api/v1/onboarding/capabilities",
            get(capability_handler::<S>),
        )
        .route("/api/v1/onboarding/account", delete(delete_account_handler::<S>))
        .route("/api/v1/sponsor/kyb/submit", post(kyb_handler::<S>))
        .route("/api/v1/sponsor/profile", patch(sponsor_profile_handler::<S>))
        .route("/api/v1/sponsor/listings", post(create_listing_handler::<S>))
        .route(
            "/api/v1/sponsor/listings/:listing_id",
            get(listing_handler::<S>).delete(delete_listing_handler::<S>),
        )
        .route(
            "/api/v1/sponsor/listings/:listing_id/:transition",
            post(listing_transition_handler::<S>),
        )
        .route("/api/v1/admin/submissions", get(review_queue_handler::<S>))
        .route(
            "/api/v1/admin/submissions/:entity_type/:entity_id/review",
            post(review_handler::<S>),
        )
        .route(
            "/api/v1/admin/submissions/:entity_type/:entity_id/comments",
            get(admin_comments_handler::<S>).post(admin_note_handler::<S>),
        )
        .with_state(service)
}

type ServiceState<S> = State<Arc<OnboardingService<S>>>;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StatusQuery {
    #[serde(default)]
    stage: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UsernameQuery {
    username: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CapabilityQuery {
    action: GuardedAction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EntityQuery {
    entity_type: String,
    entity_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReplyRequest {
    entity_type: String,
    entity_id: String,
    content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueueQuery {
    #[serde(default)]
    include_finalized: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdminNoteRequest {
    content: String,
    #[serde(default = "internal_by_default")]
    internal: bool,
}

fn internal_by_default() -> bool {
    true
}

pub(crate) async fn status_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.status(&principal, query.stage.as_deref()));
    respond(StatusCode::OK, result)
}

pub(crate) async fn profile_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    axum::Json(submission): axum::Json<ProfileSubmission>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.submit_profile(&principal, submission));
    respond(StatusCode::OK, result)
}

pub(crate) async fn questionnaire_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<QuestionnaireRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.submit_questionnaire(&principal, request));
    respond(StatusCode::ACCEPTED, result)
}

pub(crate) async fn check_username_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    Query(query): Query<UsernameQuery>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.check_username(&principal, &query.username))
        .map(|available| json!({ "username": query.username.trim(), "available": available }));
    respond(StatusCode::OK, result)
}

pub(crate) async fn identity_session_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.start_identity_session(&principal));
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn identity_resume_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<IdentityResumeRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.resume_identity(&principal, request.into()));
    respond(StatusCode::OK, result)
}

pub(crate) async fn identity_reset_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.reset_identity(&principal));
    respond(StatusCode::OK, result)
}

pub(crate) async fn comments_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    Query(query): Query<EntityQuery>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service.authenticate(bearer(&headers)).and_then(|principal| {
        let entity = parse_entity(&query.entity_type)?;
        service.comments(&principal, entity, &query.entity_id)
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn reply_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<ReplyRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service.authenticate(bearer(&headers)).and_then(|principal| {
        let entity = parse_entity(&request.entity_type)?;
        service.reply(&principal, entity, &request.entity_id, &request.content)
    });
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn capability_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    Query(query): Query<CapabilityQuery>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.check_capability(&principal, query.action));
    respond(StatusCode::OK, result)
}

pub(crate) async fn delete_account_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.delete_account(&principal));
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn kyb_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    axum::Json(request): axum::Json<KybRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.submit_sponsor_kyb(&principal, request));
    respond(StatusCode::ACCEPTED, result)
}

pub(crate) async fn sponsor_profile_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    axum::Json(patch): axum::Json<SponsorProfilePatch>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.update_sponsor_profile(&principal, patch));
    respond(StatusCode::OK, result)
}

pub(crate) async fn create_listing_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    axum::Json(draft): axum::Json<ListingDraft>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.create_listing(&principal, draft));
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn listing_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let id = ListingId(listing_id);
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.listing(&principal, &id));
    respond(StatusCode::OK, result)
}

pub(crate) async fn delete_listing_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    Path(listing_id): Path<String>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let id = ListingId(listing_id);
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.delete_listing(&principal, &id));
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn listing_transition_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    Path((listing_id, transition)): Path<(String, String)>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let id = ListingId(listing_id);
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| match transition.as_str() {
            "submit" => service.submit_listing(&principal, &id),
            "resubmit" => service.resubmit_listing(&principal, &id),
            "withdraw" => service.withdraw_listing(&principal, &id),
            _ => Err(OnboardingError::NotFound),
        });
    respond(StatusCode::OK, result)
}

pub(crate) async fn review_queue_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    Query(query): Query<QueueQuery>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service
        .authenticate(bearer(&headers))
        .and_then(|principal| service.review_queue(&principal, query.include_finalized));
    respond(StatusCode::OK, result)
}

pub(crate) async fn review_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    Path((entity_type, entity_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<ReviewRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service.authenticate(bearer(&headers)).and_then(|principal| {
        let entity = parse_entity(&entity_type)?;
        service.review(&principal, entity, &entity_id, &request)
    });
    match result {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(OnboardingError::Review(ReviewError::InvalidTransition(error)))
        | Err(OnboardingError::Transition(error)) => {
            let mut payload = transition_payload(&error);
            payload["action"] = Value::String(request.action.trim().to_ascii_uppercase());
            payload["entity_id"] = Value::String(entity_id);
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn admin_comments_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service.authenticate(bearer(&headers)).and_then(|principal| {
        let entity = parse_entity(&entity_type)?;
        service.admin_comments(&principal, entity, &entity_id)
    });
    respond(StatusCode::OK, result)
}

pub(crate) async fn admin_note_handler<S>(
    State(service): ServiceState<S>,
    headers: HeaderMap,
    Path((entity_type, entity_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<AdminNoteRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
{
    let result = service.authenticate(bearer(&headers)).and_then(|principal| {
        let entity = parse_entity(&entity_type)?;
        service.admin_note(
            &principal,
            entity,
            &entity_id,
            &request.content,
            request.internal,
        )
    });
    respond(StatusCode::CREATED, result)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn parse_entity(value: &str) -> Result<EntityType, OnboardingError> {
    value.parse::<EntityType>().map_err(|error| {
        FieldError::Invalid {
            field: "entity_type",
            reason: error.to_string(),
        }
        .into()
    })
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, OnboardingError>) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(error) => error.into_response(),
    }
}

fn field_payload(field: &str, error: &impl ToString) -> Value {
    json!({
        "field": field,
        "error": error.to_string(),
    })
}

fn transition_payload(error: &TransitionError) -> Value {
    match error {
        TransitionError::InvalidTransition {
            entity,
            current,
            requested,
        } => json!({
            "error": error.to_string(),
            "entity": entity,
            "current": current,
            "requested": requested,
        }),
    }
}

impl IntoResponse for OnboardingError {
    fn into_response(self) -> Response {
        let (status, payload) = match &self {
            OnboardingError::Field(error) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                field_payload(error.field(), error),
            ),
            OnboardingError::Profile(error) => {
                (StatusCode::UNPROCESSABLE_ENTITY, field_payload("username", error))
            }
            OnboardingError::Review(ReviewError::MissingRequiredComment { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, field_payload("comment", &self))
            }
            OnboardingError::Review(ReviewError::UnsupportedAction { entity, action }) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": self.to_string(),
                    "entity": entity,
                    "action": action,
                }),
            ),
            OnboardingError::Review(ReviewError::InvalidStatus { value }) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": self.to_string(),
                    "field": "newStatus",
                    "value": value,
                }),
            ),
            OnboardingError::Review(ReviewError::InvalidTransition(error))
            | OnboardingError::Transition(error) => {
                (StatusCode::CONFLICT, transition_payload(error))
            }
            OnboardingError::StaleSnapshot(reason) => (
                StatusCode::CONFLICT,
                json!({
                    "error": "snapshot is stale; re-fetch onboarding status",
                    "reason": reason,
                    "refetch": true,
                }),
            ),
            OnboardingError::AccessDenied(redirect) => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": self.to_string(),
                    "guard": redirect.guard,
                    "stage": redirect.stage,
                    "redirect": redirect.redirect,
                }),
            ),
            OnboardingError::NotOwner { .. } | OnboardingError::Forbidden => (
                StatusCode::FORBIDDEN,
                json!({ "error": self.to_string() }),
            ),
            OnboardingError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": self.to_string() }),
            ),
            OnboardingError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": self.to_string() }),
            ),
            OnboardingError::Provider(error) => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": "verification provider unavailable, please try again",
                    "detail": error.to_string(),
                }),
            ),
            OnboardingError::Store(StoreError::Unavailable(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": self.to_string() }),
            ),
            OnboardingError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string() }),
            ),
        };
        (status, axum::Json(payload)).into_response()
    }
}
