//! The HTTP surface. Thin handlers: authenticate, tick the lifecycle on
//! write paths, delegate to the engine, map the outcome.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use common::keys::{DayKey, SlotKey};
use engine::Engine;
use engine::usage::UsageReport;
use session::SessionManager;
use session::password;
use store::Role;

use crate::auth::{SESSION_COOKIE, require_admin, require_monitor, require_session};
use crate::error::ApiError;
use crate::export;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub sessions: Arc<SessionManager>,
    pub monitor_token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/overview", get(overview))
        .route("/day", get(day_grid))
        .route("/bid", post(bid))
        .route("/bid/bulk", post(bid_bulk))
        .route("/bid/undo", post(bid_undo))
        .route("/slot/release", post(release))
        .route("/slot/release-bulk", post(release_bulk))
        .route("/dismiss-outbid", post(dismiss_outbid))
        .route("/gpu-status", post(gpu_status))
        .route("/gpu-live-status", get(gpu_live_status))
        .route("/admin/users", post(admin_create_user))
        .route("/admin/users/delete", post(admin_delete_user))
        .route("/admin/budget", post(admin_set_budget))
        .route("/admin/advance-day", post(admin_advance_day))
        .route("/admin/export.csv", get(admin_export_csv))
        .route("/admin/reset", post(admin_reset))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SlotRequest {
    day: DayKey,
    hour: u8,
    gpu: u8,
}

impl SlotRequest {
    fn key(&self) -> Result<SlotKey, ApiError> {
        if self.hour > 23 {
            return Err(ApiError::bad_request("hour must be 0..=23"));
        }
        Ok(SlotKey::new(self.day, self.hour, self.gpu))
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let credentials = state
        .engine
        .read(|doc| {
            doc.users
                .get(&req.username)
                .map(|u| (u.salt.clone(), u.password_hash.clone(), u.role))
        })
        .await;

    // Uniform rejection: unknown users and wrong passwords look alike.
    let Some((salt, hash, role)) = credentials else {
        return Err(ApiError::unauthorized());
    };
    if !password::verify_password(&salt, &hash, &req.password) {
        return Err(ApiError::unauthorized());
    }

    let session = state
        .sessions
        .create(&req.username, role, chrono::Utc::now())
        .await;
    let ttl = state.engine.config().await.session_ttl_seconds;

    let cookie = format!(
        "{SESSION_COOKIE}={}; HttpOnly; Path=/; Max-Age={ttl}",
        session.token
    );
    let mut response = Json(json!({ "ok": true, "role": role })).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        cookie.parse().map_err(|_| ApiError::bad_request("bad token"))?,
    );
    Ok(response)
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    if let Some(token) = crate::auth::session_token(&headers) {
        state.sessions.revoke(&token).await;
    }
    Json(json!({ "ok": true }))
}

async fn overview(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<engine::view::Overview>, ApiError> {
    let session = require_session(&state, &headers).await?;
    Ok(Json(state.engine.overview(&session.username).await?))
}

#[derive(Debug, Deserialize)]
struct DayQuery {
    date: DayKey,
}

async fn day_grid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DayQuery>,
) -> Result<Json<engine::view::DayView>, ApiError> {
    let session = require_session(&state, &headers).await?;
    Ok(Json(
        state.engine.day_view(query.date, &session.username).await?,
    ))
}

async fn bid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SlotRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = require_session(&state, &headers).await?;
    state.engine.tick().await?;

    let out = state.engine.place_bid(&session.username, req.key()?).await?;
    Ok(Json(json!({
        "price": out.new_price,
        "previous": {
            "winner": out.previous_winner,
            "price": out.previous_price,
        },
    })))
}

#[derive(Debug, Deserialize)]
struct BulkBidRequest {
    bids: Vec<SlotRequest>,
}

async fn bid_bulk(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BulkBidRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = require_session(&state, &headers).await?;
    state.engine.tick().await?;

    let keys = req
        .bids
        .iter()
        .map(SlotRequest::key)
        .collect::<Result<Vec<_>, _>>()?;
    let results = state.engine.place_bulk(&session.username, &keys).await?;
    Ok(Json(json!({ "ok": true, "results": results })))
}

#[derive(Debug, Deserialize)]
struct UndoRequest {
    day: DayKey,
    hour: u8,
    gpu: u8,
    previous_winner: Option<String>,
    previous_price: u32,
}

async fn bid_undo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UndoRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = require_session(&state, &headers).await?;
    state.engine.tick().await?;

    let key = SlotRequest {
        day: req.day,
        hour: req.hour,
        gpu: req.gpu,
    }
    .key()?;
    state
        .engine
        .undo_bid(
            &session.username,
            key,
            req.previous_winner.as_deref(),
            req.previous_price,
        )
        .await?;
    Ok(Json(json!({ "ok": true })))
}

async fn release(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SlotRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = require_session(&state, &headers).await?;
    state.engine.tick().await?;

    let out = state
        .engine
        .release_slot(&session.username, req.key()?)
        .await?;
    Ok(Json(json!({ "ok": true, "refund": out.refund })))
}

#[derive(Debug, Deserialize)]
struct BulkReleaseRequest {
    slots: Vec<SlotRequest>,
}

async fn release_bulk(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BulkReleaseRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = require_session(&state, &headers).await?;
    state.engine.tick().await?;

    let keys = req
        .slots
        .iter()
        .map(SlotRequest::key)
        .collect::<Result<Vec<_>, _>>()?;
    let out = state.engine.release_bulk(&session.username, &keys).await?;
    Ok(Json(json!({
        "ok": true,
        "refund": out.refund,
        "released": out.released,
    })))
}

#[derive(Debug, Deserialize)]
struct DismissRequest {
    day: DayKey,
}

async fn dismiss_outbid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DismissRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = require_session(&state, &headers).await?;
    state.engine.tick().await?;

    state
        .engine
        .dismiss_outbid(&session.username, req.day)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

async fn gpu_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(report): Json<UsageReport>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_monitor(&state, &headers)?;
    state.engine.tick().await?;

    state.engine.ingest_usage(report).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn gpu_live_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<engine::usage::LiveStatus>, ApiError> {
    require_session(&state, &headers).await?;
    Ok(Json(state.engine.live_status().await))
}

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    username: String,
    password: String,
    #[serde(default)]
    role: Option<Role>,
    weekly_budget: u32,
}

async fn admin_create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers).await?;

    if req.username.trim().is_empty() {
        return Err(ApiError::bad_request("username must not be empty"));
    }
    if req.password.is_empty() {
        return Err(ApiError::bad_request("password must not be empty"));
    }

    let salt = password::generate_salt();
    let hash = password::hash_password(&salt, &req.password);
    state
        .engine
        .create_user(
            &req.username,
            &hash,
            &salt,
            req.role.unwrap_or(Role::User),
            req.weekly_budget,
        )
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct UsernameRequest {
    username: String,
}

async fn admin_delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UsernameRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let admin = require_admin(&state, &headers).await?;
    if admin.username == req.username {
        return Err(ApiError::bad_request("cannot delete your own account"));
    }

    state.engine.delete_user(&req.username).await?;
    state.sessions.revoke_user(&req.username).await;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct BudgetRequest {
    username: String,
    weekly_budget: u32,
}

async fn admin_set_budget(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BudgetRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers).await?;
    state
        .engine
        .set_budget(&req.username, req.weekly_budget)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

async fn admin_advance_day(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers).await?;

    let transition = state.engine.force_advance().await?;
    Ok(Json(json!({
        "ok": true,
        "transition": transition.map(|t| format!("{t:?}")),
    })))
}

async fn admin_export_csv(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DayQuery>,
) -> Result<Response, ApiError> {
    require_admin(&state, &headers).await?;

    let body = export::day_csv(&state.engine, query.date).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.csv\"", query.date),
            ),
        ],
        body,
    )
        .into_response())
}

async fn admin_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers).await?;

    state.engine.reset().await?;
    state.engine.tick().await?;
    Ok(Json(json!({ "ok": true })))
}
