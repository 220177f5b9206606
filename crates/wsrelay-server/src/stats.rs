//! Stats HTTP endpoint.
//!
//! Read-only view of the registry for monitoring. Every response is wrapped
//! as `{"code":..,"msg":..,"data":..}`.

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;
use wsrelay_core::RegistryStats;

use crate::SharedDriver;

/// Response wrapper shared by every stats route.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// 0 on success, HTTP status otherwise
    pub code: u16,
    /// Short status text
    pub msg: &'static str,
    /// Payload
    pub data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { code: 0, msg: "OK", data }
    }
}

/// Registry counts as served by `/api/ws-stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsBody {
    /// Connections in the live set
    pub live_connections: usize,
    /// Connections with a registered handle
    pub mapped_connections: usize,
    /// Usernames currently bound
    pub live_sessions: usize,
}

impl From<RegistryStats> for StatsBody {
    fn from(stats: RegistryStats) -> Self {
        Self {
            live_connections: stats.live_connections,
            mapped_connections: stats.mapped_connections,
            live_sessions: stats.live_sessions,
        }
    }
}

/// Build the stats router.
pub fn router(driver: SharedDriver) -> Router {
    Router::new()
        .route("/api/ws-stat", get(ws_stat))
        .route("/api/ws-users", get(ws_users))
        .fallback(not_found)
        .with_state(driver)
}

async fn ws_stat(State(driver): State<SharedDriver>) -> Json<ApiResponse<StatsBody>> {
    let stats = driver.lock().await.stats();
    Json(ApiResponse::ok(stats.into()))
}

async fn ws_users(State(driver): State<SharedDriver>) -> Json<ApiResponse<Vec<String>>> {
    let users = driver.lock().await.usernames().into_iter().collect();
    Json(ApiResponse::ok(users))
}

async fn not_found() -> (StatusCode, Json<ApiResponse<Option<()>>>) {
    let body = ApiResponse { code: StatusCode::NOT_FOUND.as_u16(), msg: "NOT FOUND", data: None };
    (StatusCode::NOT_FOUND, Json(body))
}
