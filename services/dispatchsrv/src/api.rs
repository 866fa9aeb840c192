//! HTTP surface
//!
//! Alarm and push routes answer a bad key with 401; data routes answer 403.
//! The key travels as `?securitykey=` and is checked before the body is read.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::{AppError, SuccessResponse};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::{DispatchError, Result};
use crate::poller::UNAVAILABLE_MESSAGE;
use crate::service::DispatchService;

type SharedService = Arc<DispatchService>;

#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    pub securitykey: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlaceQuery {
    pub securitykey: Option<String>,
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Deserialize)]
pub struct LogLevelForm {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub psw: String,
}

pub fn create_router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health))
        // Alarm channel
        .route("/triggerAlarm", post(trigger_alarm))
        .route("/alarm", post(compose_alarm))
        .route("/pushMessage", post(push_message))
        // Roster and incident
        .route("/people", post(people))
        .route("/call", post(call))
        .route("/roster", get(roster_snapshot))
        .route("/roster/poll/start", post(start_polling))
        .route("/roster/poll/stop", post(stop_polling))
        // Lookup data
        .route("/places", get(search_places))
        .route("/places/resolve", get(resolve_place))
        .route("/groups", get(groups))
        .route("/passwordcheck", post(password_check))
        // Runtime log level
        .route("/logging/level", get(log_level).post(set_log_level))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(service)
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| DispatchError::Validation(format!("Invalid body: {}", e)))
}

fn forbid_unless(service: &DispatchService, query_key: Option<&str>) -> std::result::Result<(), AppError> {
    if service.authorize(query_key) {
        Ok(())
    } else {
        Err(AppError::forbidden("Forbidden"))
    }
}

fn unavailable(err: &DispatchError) -> AppError {
    warn!("Upstream data unavailable: {}", err);
    AppError::service_unavailable(UNAVAILABLE_MESSAGE).with_details(err.to_string())
}

async fn health(State(service): State<SharedService>) -> impl IntoResponse {
    Json(service.health().await)
}

// ============================================================================
// Alarm and push
// ============================================================================

async fn trigger_alarm(
    State(service): State<SharedService>,
    Query(query): Query<KeyQuery>,
    body: Bytes,
) -> Result<Response> {
    let key = query.securitykey.as_deref();
    service.require(key)?;
    let status = service
        .authorize_and_trigger_alarm(key, parse_body(&body)?)
        .await?;
    Ok(Json(SuccessResponse::new(status)).into_response())
}

async fn compose_alarm(
    State(service): State<SharedService>,
    Query(query): Query<KeyQuery>,
    body: Bytes,
) -> Result<Response> {
    let key = query.securitykey.as_deref();
    service.require(key)?;
    let status = service
        .authorize_and_compose_alarm(key, parse_body(&body)?)
        .await?;
    Ok(Json(SuccessResponse::new(status)).into_response())
}

async fn push_message(
    State(service): State<SharedService>,
    Query(query): Query<KeyQuery>,
    body: Bytes,
) -> Result<Response> {
    let key = query.securitykey.as_deref();
    service.require(key)?;
    let status = service
        .authorize_and_send_push(key, parse_body(&body)?)
        .await?;
    Ok(Json(SuccessResponse::new(status)).into_response())
}

// ============================================================================
// Roster and incident
// ============================================================================

async fn people(
    State(service): State<SharedService>,
    Query(query): Query<KeyQuery>,
) -> std::result::Result<Response, AppError> {
    forbid_unless(&service, query.securitykey.as_deref())?;
    match service.get_roster().await {
        Ok(view) => Ok(Json(SuccessResponse::new(view)).into_response()),
        Err(e) => Err(unavailable(&e)),
    }
}

async fn call(
    State(service): State<SharedService>,
    Query(query): Query<KeyQuery>,
) -> std::result::Result<Response, AppError> {
    forbid_unless(&service, query.securitykey.as_deref())?;
    match service.get_incident_state().await {
        Ok(view) => Ok(Json(SuccessResponse::new(view)).into_response()),
        Err(e) => Err(unavailable(&e)),
    }
}

async fn roster_snapshot(
    State(service): State<SharedService>,
    Query(query): Query<KeyQuery>,
) -> std::result::Result<Response, AppError> {
    forbid_unless(&service, query.securitykey.as_deref())?;
    let snapshot = service.roster_snapshot().await;
    Ok(Json(
        SuccessResponse::new(snapshot).with_metadata("polling", json!(service.is_polling())),
    )
    .into_response())
}

async fn start_polling(
    State(service): State<SharedService>,
    Query(query): Query<KeyQuery>,
) -> std::result::Result<Response, AppError> {
    forbid_unless(&service, query.securitykey.as_deref())?;
    let started = service.start_polling();
    Ok(Json(SuccessResponse::new(json!({"polling": true, "started": started}))).into_response())
}

async fn stop_polling(
    State(service): State<SharedService>,
    Query(query): Query<KeyQuery>,
) -> std::result::Result<Response, AppError> {
    forbid_unless(&service, query.securitykey.as_deref())?;
    let stopped = service.stop_polling();
    Ok(Json(SuccessResponse::new(json!({"polling": false, "stopped": stopped}))).into_response())
}

// ============================================================================
// Lookup data
// ============================================================================

async fn search_places(
    State(service): State<SharedService>,
    Query(query): Query<PlaceQuery>,
) -> std::result::Result<Response, AppError> {
    forbid_unless(&service, query.securitykey.as_deref())?;
    Ok(Json(SuccessResponse::new(service.search_places(&query.q))).into_response())
}

async fn resolve_place(
    State(service): State<SharedService>,
    Query(query): Query<PlaceQuery>,
) -> std::result::Result<Response, AppError> {
    forbid_unless(&service, query.securitykey.as_deref())?;
    let place = service.resolve_place(&query.input);
    Ok(Json(SuccessResponse::new(json!({
        "input": query.input,
        "found": place.is_some(),
        "place": place,
    })))
    .into_response())
}

async fn groups(
    State(service): State<SharedService>,
    Query(query): Query<KeyQuery>,
) -> std::result::Result<Response, AppError> {
    forbid_unless(&service, query.securitykey.as_deref())?;
    Ok(Json(SuccessResponse::new(service.groups())).into_response())
}

async fn password_check(
    State(service): State<SharedService>,
    body: Bytes,
) -> std::result::Result<Response, AppError> {
    let form: PasswordForm = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("Invalid body: {}", e)))?;
    match service.check_password(&form.psw) {
        Some(redirect_url) => Ok(Json(json!({ "redirectUrl": redirect_url })).into_response()),
        None => Err(AppError::forbidden("Unauthorized")),
    }
}

// ============================================================================
// Logging
// ============================================================================

async fn log_level(
    State(service): State<SharedService>,
    Query(query): Query<KeyQuery>,
) -> std::result::Result<Response, AppError> {
    forbid_unless(&service, query.securitykey.as_deref())?;
    let level = common::logging::get_log_level();
    Ok(Json(SuccessResponse::new(json!({ "level": level }))).into_response())
}

async fn set_log_level(
    State(service): State<SharedService>,
    Query(query): Query<KeyQuery>,
    body: Bytes,
) -> std::result::Result<Response, AppError> {
    forbid_unless(&service, query.securitykey.as_deref())?;
    let form: LogLevelForm = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("Invalid body: {}", e)))?;
    common::logging::set_log_level(&form.level).map_err(AppError::bad_request)?;
    Ok(Json(SuccessResponse::new(json!({ "level": form.level }))).into_response())
}
