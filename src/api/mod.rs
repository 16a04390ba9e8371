use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::*;
use serde::{Deserialize, Serialize};

use crate::autofill::registry::AutofillService;
use crate::autofill::{AutofillRequest, SegmentAutofillPlan, SegmentAutofillSuggestion};
use crate::services::database::{AppliedPlan, SegmentStore};
use crate::{GenericError, SmartFillError, StoreError};

pub const HEALTH_PATH: &str = "/health";
pub const AUTOFILL_PATH: &str = "/api/autofill";
pub const APPLY_PATH: &str = "/api/itineraries/{id}/autofill/apply";

#[derive(Clone)]
pub struct AppState {
    pub autofill: Arc<AutofillService>,
    pub store: Option<Arc<dyn SegmentStore>>,
    pub timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("no suggestion found")]
    NoMatch(),

    #[error("smart fill is not configured: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Upstream(String),

    #[error("smart fill timed out")]
    Timeout(),

    #[error("storage is not configured")]
    StorageDisabled(),

    #[error("a bearer session token is required")]
    Unauthorized(),

    /// The plan failed part way; `applied` is what remains committed.
    #[error("{message}")]
    Aborted { message: String, applied: AppliedPlan },

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NoMatch() => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) | ApiError::StorageDisabled() => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout() => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Unauthorized() => StatusCode::UNAUTHORIZED,
            ApiError::Aborted { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let mut body = serde_json::json!({ "error": self.to_string() });
        if let ApiError::Aborted { applied, .. } = &self {
            body["applied"] = serde_json::json!(applied);
        }
        (code, Json(body)).into_response()
    }
}

impl From<SmartFillError> for ApiError {
    fn from(e: SmartFillError) -> Self {
        match e {
            SmartFillError::ProviderUnavailable { provider } => {
                ApiError::Unavailable(provider.to_string())
            }
            SmartFillError::InvalidRequest(message) => ApiError::BadRequest(message),
            other @ SmartFillError::ProviderRequest { .. } => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<GenericError> for ApiError {
    fn from(e: GenericError) -> Self {
        match e.downcast::<StoreError>() {
            Ok(store) => match *store {
                StoreError::Aborted { applied, message } => ApiError::Aborted {
                    message: format!("plan aborted: {message}"),
                    applied,
                },
                StoreError::EmptyPlan() => ApiError::BadRequest("plan has no actions".to_string()),
                other => ApiError::Internal(other.to_string()),
            },
            Err(other) => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct ApplyPlanRequest {
    pub plan: SegmentAutofillPlan,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(HEALTH_PATH, get(health))
        .route(AUTOFILL_PATH, post(autofill))
        .route(APPLY_PATH, post(apply_plan))
}

pub fn router(state: AppState) -> Router {
    routes().with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn autofill(
    State(state): State<AppState>,
    payload: Result<Json<AutofillRequest>, JsonRejection>,
) -> Result<Json<Data<SegmentAutofillSuggestion>>, ApiError> {
    let Json(request) = payload?;
    trace!("Received {} autofill request.", request.kind);

    let plans = tokio::time::timeout(state.timeout, state.autofill.suggest(&request))
        .await
        .map_err(|_| ApiError::Timeout())??;
    let suggestion = SegmentAutofillSuggestion::from_plans(plans).ok_or(ApiError::NoMatch())?;
    Ok(Json(Data { data: suggestion }))
}

async fn apply_plan(
    State(state): State<AppState>,
    Path(itinerary_id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ApplyPlanRequest>, JsonRejection>,
) -> Result<Json<Data<AppliedPlan>>, ApiError> {
    let store = state.store.as_ref().ok_or(ApiError::StorageDisabled())?;
    let Json(ApplyPlanRequest { plan }) = payload?;
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized())?;
    if plan.actions.is_empty() {
        return Err(ApiError::BadRequest("plan has no actions".to_string()));
    }

    let applied = store
        .apply_plan(&itinerary_id, &plan, &token)
        .await
        .map_err(|e| {
            warn!("Applying plan to itinerary {itinerary_id} failed: {e}");
            ApiError::from(e)
        })?;
    Ok(Json(Data { data: applied }))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn provider_errors_map_to_distinct_statuses() {
        let unavailable: ApiError = SmartFillError::unavailable("aerodatabox").into();
        assert_eq!(
            unavailable.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let upstream: ApiError = SmartFillError::request("navitia", "500").into();
        assert_eq!(upstream.into_response().status(), StatusCode::BAD_GATEWAY);
        let invalid: ApiError = SmartFillError::InvalidRequest("empty".to_string()).into();
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn aborted_plans_keep_what_is_still_applied() {
        let store: GenericError = Box::new(StoreError::Aborted {
            applied: AppliedPlan {
                created: vec!["seg-1".to_string()],
                deleted: vec![],
            },
            message: "database rejected the request: 409 - conflict".to_string(),
        });
        match ApiError::from(store) {
            ApiError::Aborted { message, applied } => {
                assert!(message.starts_with("plan aborted:"));
                assert_eq!(applied.created, vec!["seg-1".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let unknown: GenericError = "socket closed".into();
        assert!(matches!(ApiError::from(unknown), ApiError::Internal(_)));
    }

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic xyz"));
        assert_eq!(bearer_token(&headers), None);
    }
}
