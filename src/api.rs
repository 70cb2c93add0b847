// 🌐 Admissions REST API - cohort membership endpoints over axum
//
// Handlers lock the shared connection, run one engine operation, and
// project the result. Every failure answers `{detail, status_code}`.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, put},
    Router,
};
use rusqlite::Connection;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::config::Config;
use crate::delete::{delete_memberships, DeleteSelector};
use crate::error::AdmissionsError;
use crate::filter::MembershipFilter;
use crate::membership::MembershipUpdated;
use crate::monitoring::{run_script, ACTIVE_ON_ENDED};
use crate::pagination::{Page, PageRequest};
use crate::reconcile::{apply_update_payload, create_memberships, parse_create_batch, UpdatePayload};

pub const API_ACTOR: &str = "admissions_api";

const MEMBERSHIPS_PATH: &str = "/academy/cohort/user";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(conn: Connection, config: Config) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::internal("database connection lock poisoned"))
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<AdmissionsError> for ApiError {
    fn from(err: AdmissionsError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        ApiError {
            status,
            detail: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), detail = %self.detail, "request failed");
        } else {
            warn!(status = self.status.as_u16(), detail = %self.detail, "request rejected");
        }

        let body = json!({
            "detail": self.detail,
            "status_code": self.status.as_u16(),
        });

        (self.status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

// ============================================================================
// Request helpers
// ============================================================================

/// `Academy` header → academy scope; absent means unscoped
fn academy_scope(headers: &HeaderMap) -> Result<Option<i64>, ApiError> {
    let Some(raw) = headers.get("academy") else {
        return Ok(None);
    };

    let text = raw.to_str().unwrap_or_default().trim();
    text.parse::<i64>().map(Some).map_err(|_| {
        AdmissionsError::InvalidIdentifier {
            field: "academy",
            value: text.to_string(),
        }
        .into()
    })
}

fn parse_path_id(field: &'static str, raw: &str) -> Result<i64, ApiError> {
    raw.trim().parse::<i64>().map_err(|_| {
        AdmissionsError::InvalidIdentifier {
            field,
            value: raw.to_string(),
        }
        .into()
    })
}

/// Request body as JSON; an empty body reads as null
fn json_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Malformed JSON: {}", e)))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

/// GET /academy/cohort/user
async fn list_memberships(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult {
    let mut filter =
        MembershipFilter::from_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    if let Some(academy) = academy_scope(&headers)? {
        filter = filter.with_academy_scope(academy);
    }

    let conn = state.conn()?;

    match PageRequest::from_params(&params, state.config.page_size) {
        Some(request) => {
            let count = filter.count(&conn)?;
            let results = filter.fetch_page(&conn, request.limit, request.offset)?;
            let page = Page::new(results, count, request, MEMBERSHIPS_PATH, &params);
            Ok(Json(page).into_response())
        }
        None => Ok(Json(filter.fetch_listings(&conn)?).into_response()),
    }
}

/// POST /academy/cohort/user
async fn create_batch(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let items = parse_create_batch(&json_body(&body)?)?;

    let mut conn = state.conn()?;
    let created = create_memberships(&mut conn, &items, API_ACTOR)?;

    Ok((StatusCode::CREATED, Json(created)).into_response())
}

/// PUT /academy/cohort/user
async fn update_batch(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let payload = UpdatePayload::from_json(&json_body(&body)?, (None, None))?;
    run_update(&state, &payload)
}

/// PUT /academy/cohort/:cohort_id/user/:user_id
async fn update_one(
    State(state): State<AppState>,
    Path((cohort_id, user_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult {
    let path = (
        Some(parse_path_id("cohort", &cohort_id)?),
        Some(parse_path_id("user", &user_id)?),
    );
    let payload = UpdatePayload::from_json(&json_body(&body)?, path)?;
    run_update(&state, &payload)
}

fn run_update(state: &AppState, payload: &UpdatePayload) -> ApiResult {
    let mut conn = state.conn()?;
    let updated = apply_update_payload(&mut conn, payload, API_ACTOR)?;
    let mut projected: Vec<MembershipUpdated> = updated.into_iter().map(Into::into).collect();

    if payload.is_batch() {
        return Ok(Json(projected).into_response());
    }

    match projected.pop() {
        Some(single) => Ok(Json(single).into_response()),
        None => Err(ApiError::internal("single update produced no record")),
    }
}

/// DELETE /academy/cohort/user?id=… or ?user=…&cohort=…
async fn delete_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> ApiResult {
    let selector =
        DeleteSelector::from_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
    let scope = academy_scope(&headers)?;

    let mut conn = state.conn()?;
    delete_memberships(&mut conn, &selector, scope, API_ACTOR)?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// DELETE /academy/cohort/:cohort_id/user/:user_id
async fn delete_one(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((cohort_id, user_id)): Path<(String, String)>,
) -> ApiResult {
    let cohort = parse_path_id("cohort", &cohort_id)?;
    let user = parse_path_id("user", &user_id)?;
    let scope = academy_scope(&headers)?;

    let mut conn = state.conn()?;
    let selector = DeleteSelector::one(cohort, user);
    let removed = delete_memberships(&mut conn, &selector, scope, API_ACTOR)?;

    if removed == 0 {
        return Err(AdmissionsError::not_found(
            "CohortUser",
            format!("user {} in cohort {}", user, cohort),
        )
        .into());
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// GET /academy/:academy_id/monitoring/active-on-ended
async fn active_on_ended(
    State(state): State<AppState>,
    Path(academy_id): Path<String>,
) -> ApiResult {
    let academy_id = parse_path_id("academy", &academy_id)?;

    let conn = state.conn()?;
    let report = run_script(&conn, ACTIVE_ON_ENDED, academy_id)?;

    Ok(Json(report).into_response())
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            MEMBERSHIPS_PATH,
            get(list_memberships)
                .post(create_batch)
                .put(update_batch)
                .delete(delete_batch),
        )
        .route(
            "/academy/cohort/:cohort_id/user/:user_id",
            put(update_one).delete(delete_one),
        )
        .route(
            "/academy/:academy_id/monitoring/active-on-ended",
            get(active_on_ended),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
