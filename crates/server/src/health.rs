use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use optiquote_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    sweeper_enabled: bool,
    notifications_enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub sweeper: HealthCheck,
    pub notifications: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, sweeper_enabled: bool, notifications_enabled: bool) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(HealthState { db_pool, sweeper_enabled, notifications_enabled })
}

/// Only the database decides readiness; a disabled sweeper or notifier is a
/// configuration choice, reported but not degraded.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        sweeper: toggle_check(state.sweeper_enabled, "expiration sweeper"),
        notifications: toggle_check(state.notifications_enabled, "expiration warning webhook"),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn toggle_check(enabled: bool, component: &str) -> HealthCheck {
    if enabled {
        HealthCheck { status: "enabled", detail: format!("{component} running") }
    } else {
        HealthCheck { status: "disabled", detail: format!("{component} disabled by configuration") }
    }
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quote").fetch_one(pool).await {
        Ok(count) => HealthCheck { status: "ready", detail: format!("{count} quotes stored") },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}
