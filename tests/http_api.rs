mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use smart_fill::api::{router, AppState};
use smart_fill::autofill::registry::AutofillService;
use smart_fill::autofill::{PlanAction, SegmentAutofillPlan};
use smart_fill::services::database::{AppliedPlan, SegmentStore};
use smart_fill::{GenericError, StoreError};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{config_for, park_hyatt_nominatim};

#[derive(Default)]
struct RecordingStore {
    calls: Mutex<Vec<(String, usize, String)>>,
}

#[async_trait]
impl SegmentStore for RecordingStore {
    async fn apply_plan(
        &self,
        itinerary_id: &str,
        plan: &SegmentAutofillPlan,
        access_token: &str,
    ) -> Result<AppliedPlan, GenericError> {
        self.calls.lock().unwrap().push((
            itinerary_id.to_string(),
            plan.actions.len(),
            access_token.to_string(),
        ));
        let mut applied = AppliedPlan::default();
        for (index, action) in plan.actions.iter().enumerate() {
            match action {
                PlanAction::Create { .. } => applied.created.push(format!("seg-{index}")),
                PlanAction::Delete { segment_id } => applied.deleted.push(segment_id.clone()),
            }
        }
        Ok(applied)
    }
}

/// Fails every plan after the first action, leaving that row behind.
struct StuckStore;

#[async_trait]
impl SegmentStore for StuckStore {
    async fn apply_plan(
        &self,
        _itinerary_id: &str,
        _plan: &SegmentAutofillPlan,
        _access_token: &str,
    ) -> Result<AppliedPlan, GenericError> {
        Err(StoreError::Aborted {
            applied: AppliedPlan {
                created: vec!["seg-1".to_string()],
                deleted: vec![],
            },
            message: "database rejected the request: 409 - conflict".to_string(),
        }
        .into())
    }
}

fn state(server: &MockServer, store: Option<Arc<dyn SegmentStore>>) -> AppState {
    AppState {
        autofill: Arc::new(AutofillService::with_client(
            &config_for(&server.uri()),
            reqwest::Client::new(),
        )),
        store,
        timeout: Duration::from_secs(5),
    }
}

async fn post(state: AppState, uri: &str, body: Body, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        request = request.header("authorization", format!("Bearer {token}"));
    }
    let response = router(state)
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_is_ok() {
    let server = MockServer::start().await;
    let response = router(state(&server, None))
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn hotel_autofill_returns_data_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(park_hyatt_nominatim()))
        .mount(&server)
        .await;

    let body = json!({"type": "hotel", "query": "Park Hyatt Tokyo"}).to_string();
    let (status, value) = post(state(&server, None), "/api/autofill", Body::from(body), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["data"]["segment"]["type"], "hotel");
    assert_eq!(value["data"]["segment"]["metadata"]["source"], "nominatim");
    assert!(value["data"]["segment"]["location_lat"].is_number());
    assert_eq!(value["data"]["plans"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unconfigured_flight_lookup_is_service_unavailable() {
    let server = MockServer::start().await;
    let body = json!({"type": "flight", "query": "UA120", "date": "2024-05-01"}).to_string();
    let (status, value) = post(state(&server, None), "/api/autofill", Body::from(body), None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(value["error"]
        .as_str()
        .unwrap()
        .starts_with("smart fill is not configured"));
}

#[tokio::test]
async fn no_match_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let body = json!({"type": "activity", "query": "Atlantis"}).to_string();
    let (status, value) = post(state(&server, None), "/api/autofill", Body::from(body), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(value["error"], "no suggestion found");
}

#[tokio::test]
async fn malformed_request_is_bad_request() {
    let server = MockServer::start().await;
    let (status, value) = post(
        state(&server, None),
        "/api/autofill",
        Body::from(r#"{"type": "spaceship", "query": "x"}"#),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(value["error"].is_string());
}

#[tokio::test]
async fn apply_requires_storage() {
    let server = MockServer::start().await;
    let body = json!({"plan": {"title": "x", "actions": [{"type": "delete", "segmentId": "s1"}]}});
    let (status, _) = post(
        state(&server, None),
        "/api/itineraries/itin-1/autofill/apply",
        Body::from(body.to_string()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn apply_forwards_plan_and_session_token() {
    let server = MockServer::start().await;
    let store = Arc::new(RecordingStore::default());
    let body = json!({"plan": {
        "title": "Replace flight",
        "actions": [
            {"type": "delete", "segmentId": "old-leg"},
            {"type": "create", "segment": {
                "type": "flight",
                "title": "UA120",
                "metadata": {"source": "aerodatabox"},
                "source": "aerodatabox"
            }}
        ]
    }});

    let (status, value) = post(
        state(&server, Some(store.clone() as Arc<dyn SegmentStore>)),
        "/api/itineraries/itin-9/autofill/apply",
        Body::from(body.to_string()),
        Some("session-jwt"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["data"], json!({"created": ["seg-1"], "deleted": ["old-leg"]}));
    assert_eq!(
        store.calls.lock().unwrap().clone(),
        vec![("itin-9".to_string(), 2, "session-jwt".to_string())]
    );

    let empty = json!({"plan": {"title": "Nothing", "actions": []}});
    let (status, _) = post(
        state(&server, Some(store as Arc<dyn SegmentStore>)),
        "/api/itineraries/itin-9/autofill/apply",
        Body::from(empty.to_string()),
        Some("session-jwt"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn apply_without_session_token_is_unauthorized() {
    let server = MockServer::start().await;
    let store = Arc::new(RecordingStore::default());
    let body = json!({"plan": {"title": "x", "actions": [{"type": "delete", "segmentId": "s1"}]}});

    let (status, value) = post(
        state(&server, Some(store.clone() as Arc<dyn SegmentStore>)),
        "/api/itineraries/itin-1/autofill/apply",
        Body::from(body.to_string()),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(value["error"].is_string());
    assert!(store.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn aborted_apply_reports_rows_left_behind() {
    let server = MockServer::start().await;
    let body = json!({"plan": {"title": "x", "actions": [{"type": "delete", "segmentId": "s1"}]}});

    let (status, value) = post(
        state(&server, Some(Arc::new(StuckStore) as Arc<dyn SegmentStore>)),
        "/api/itineraries/itin-1/autofill/apply",
        Body::from(body.to_string()),
        Some("session-jwt"),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(value["error"].as_str().unwrap().starts_with("plan aborted"));
    assert_eq!(value["applied"], json!({"created": ["seg-1"], "deleted": []}));
}

#[tokio::test]
async fn slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(park_hyatt_nominatim())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let mut impatient = state(&server, None);
    impatient.timeout = Duration::from_millis(100);
    let body = json!({"type": "hotel", "query": "Park Hyatt Tokyo"}).to_string();
    let (status, value) = post(impatient, "/api/autofill", Body::from(body), None).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(value["error"], "smart fill timed out");
}
