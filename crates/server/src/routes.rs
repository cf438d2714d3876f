//! Quote lifecycle JSON API.
//!
//! - `POST /api/v1/quotes`: create a quote in BUILDING
//! - `GET  /api/v1/quotes/{quote_id}/status`: status, next valid states, expiry, completeness
//! - `POST /api/v1/quotes/{quote_id}/status`: request a status change
//! - `GET  /api/v1/quotes/{quote_id}/history`: applied transitions, oldest first

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use optiquote_core::domain::actor::{ActingUser, UserRole};
use optiquote_core::domain::quote::{QuoteId, QuoteStatus};
use optiquote_core::errors::{approval_prompt, InterfaceError};
use optiquote_db::StatusHistoryEntry;

use crate::lifecycle::{QuoteLifecycleService, QuoteStatusView, StatusChange};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    service: QuoteLifecycleService,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub target_status: String,
    pub actor_id: String,
    pub actor_role: String,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateQuoteRequest {
    #[serde(default)]
    pub quote_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChangeStatusResponse {
    #[serde(flatten)]
    pub change: StatusChange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub user_message: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmet: Vec<String>,
    pub correlation_id: String,
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let user_message = self.0.user_message();
        let (status, error, message, unmet, correlation_id) = match self.0 {
            InterfaceError::BadRequest { message, correlation_id } => {
                (StatusCode::BAD_REQUEST, "bad_request", message, Vec::new(), correlation_id)
            }
            InterfaceError::NotFound { message, correlation_id } => {
                (StatusCode::NOT_FOUND, "not_found", message, Vec::new(), correlation_id)
            }
            InterfaceError::Conflict { message, correlation_id } => {
                (StatusCode::CONFLICT, "conflict", message, Vec::new(), correlation_id)
            }
            InterfaceError::TransitionNotAllowed { message, correlation_id } => (
                StatusCode::CONFLICT,
                "transition_not_allowed",
                message,
                Vec::new(),
                correlation_id,
            ),
            InterfaceError::AlreadyExists { message, correlation_id } => {
                (StatusCode::CONFLICT, "already_exists", message, Vec::new(), correlation_id)
            }
            InterfaceError::Unprocessable { message, unmet, correlation_id } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "precondition_failed",
                message,
                unmet,
                correlation_id,
            ),
            InterfaceError::ServiceUnavailable { message, correlation_id } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                message,
                Vec::new(),
                correlation_id,
            ),
        };

        (status, Json(ErrorBody { error, message, user_message, unmet, correlation_id }))
            .into_response()
    }
}

pub fn router(service: QuoteLifecycleService) -> Router {
    Router::new()
        .route("/api/v1/quotes", post(create_quote))
        .route(
            "/api/v1/quotes/{quote_id}/status",
            get(get_quote_status).post(change_quote_status),
        )
        .route("/api/v1/quotes/{quote_id}/history", get(get_quote_history))
        .with_state(ApiState { service })
}

fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("req-{}", Uuid::new_v4()))
}

async fn create_quote(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateQuoteRequest>,
) -> Result<(StatusCode, Json<QuoteStatusView>), ApiError> {
    let correlation_id = correlation_id(&headers);
    let requested_id = match request.quote_id.map(|id| id.trim().to_string()) {
        Some(id) if id.is_empty() => {
            return Err(ApiError::bad_request("quote_id must not be blank", &correlation_id))
        }
        other => other.map(QuoteId),
    };

    let quote = state
        .service
        .create_quote(requested_id, &correlation_id)
        .await
        .map_err(|error| ApiError(error.into_interface(&correlation_id)))?;

    Ok((StatusCode::CREATED, Json(state.service.status_view(&quote))))
}

async fn get_quote_status(
    State(state): State<ApiState>,
    Path(quote_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<QuoteStatusView>, ApiError> {
    let correlation_id = correlation_id(&headers);
    state
        .service
        .get_quote_status(&QuoteId(quote_id))
        .await
        .map(Json)
        .map_err(|error| ApiError(error.into_interface(correlation_id)))
}

async fn change_quote_status(
    State(state): State<ApiState>,
    Path(quote_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ChangeStatusRequest>,
) -> Result<(StatusCode, Json<ChangeStatusResponse>), ApiError> {
    let correlation_id = correlation_id(&headers);

    let target = QuoteStatus::parse(&request.target_status).ok_or_else(|| {
        ApiError::bad_request(
            format!("unknown target_status `{}`", request.target_status),
            &correlation_id,
        )
    })?;
    let role = UserRole::parse(&request.actor_role).ok_or_else(|| {
        ApiError::bad_request(
            format!("unknown actor_role `{}`", request.actor_role),
            &correlation_id,
        )
    })?;
    // The system identity is reserved for scheduled jobs.
    if role == UserRole::System {
        return Err(ApiError::bad_request(
            "actor_role `system` is not accepted here",
            &correlation_id,
        ));
    }
    if request.actor_id.trim().is_empty() {
        return Err(ApiError::bad_request("actor_id must not be blank", &correlation_id));
    }

    let actor = ActingUser::new(request.actor_id.trim(), role);
    let reason = request.reason.map(|reason| reason.trim().to_string()).filter(|r| !r.is_empty());

    let change = state
        .service
        .change_quote_status(&QuoteId(quote_id), target, &actor, reason, &correlation_id)
        .await
        .map_err(|error| ApiError(error.into_interface(&correlation_id)))?;

    let (status, message) = match &change {
        StatusChange::Applied { .. } => (StatusCode::OK, None),
        StatusChange::PendingApproval { required_role, reason, .. } => {
            (StatusCode::ACCEPTED, Some(approval_prompt(*required_role, reason)))
        }
    };

    Ok((status, Json(ChangeStatusResponse { change, message, correlation_id })))
}

async fn get_quote_history(
    State(state): State<ApiState>,
    Path(quote_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<StatusHistoryEntry>>, ApiError> {
    let correlation_id = correlation_id(&headers);
    state
        .service
        .status_history(&QuoteId(quote_id))
        .await
        .map(Json)
        .map_err(|error| ApiError(error.into_interface(correlation_id)))
}
