use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use souk_db::DbPool;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    sweeper_enabled: bool,
}

impl HealthState {
    pub fn new(db_pool: DbPool, sweeper_enabled: bool) -> Self {
        Self { db_pool, sweeper_enabled }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

/// Open work the sweeper is responsible for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Backlog {
    pub active_rfqs: i64,
    pub open_quotes: i64,
    pub live_counter_offers: i64,
    pub pending_order_intents: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub sweeper: HealthCheck,
    pub backlog: Option<Backlog>,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (database, backlog) = match backlog(&state.db_pool).await {
        Ok(backlog) => (
            HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
            Some(backlog),
        ),
        Err(error) => (
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") },
            None,
        ),
    };
    let ready = database.status == "ready";

    let sweeper = if state.sweeper_enabled {
        HealthCheck { status: "ready", detail: "periodic sweep running".to_string() }
    } else {
        HealthCheck { status: "disabled", detail: "sweeper.enabled is false".to_string() }
    };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        sweeper,
        backlog,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn backlog(pool: &DbPool) -> Result<Backlog, sqlx::Error> {
    let (active_rfqs, open_quotes, live_counter_offers, pending_order_intents): (
        i64,
        i64,
        i64,
        i64,
    ) = sqlx::query_as(
        "SELECT
            (SELECT COUNT(*) FROM rfq WHERE status = 'active'),
            (SELECT COUNT(*) FROM quote WHERE status IN ('pending', 'negotiating')),
            (SELECT COUNT(*) FROM negotiation_entry WHERE status = 'pending'),
            (SELECT COUNT(*) FROM order_intent WHERE status = 'pending')",
    )
    .fetch_one(pool)
    .await?;

    Ok(Backlog { active_rfqs, open_quotes, live_counter_offers, pending_order_intents })
}
