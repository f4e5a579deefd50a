/*!
Keepalive HTTP endpoint.

Hosting platforms that idle out silent processes poll `/` or `/health`; `/api/v1/status`
gives a quick look at what the bot has done so far.
*/

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::serde::json::Json;
use rocket::{get, routes, Build, Rocket, State};
use serde::Serialize;

use crate::storage::SqliteStore;

pub const ONLINE_MESSAGE: &str = "WABeta News Bot is Online!";

struct AppState {
    started_at: DateTime<Utc>,
    store: SqliteStore,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    posts: i64,
    users: i64,
}

#[get("/")]
async fn index() -> &'static str {
    ONLINE_MESSAGE
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

#[get("/api/v1/status")]
async fn status(state: &State<AppState>) -> Json<StatusResponse> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    let (posts, users) = match state.store.stats().await {
        Ok(stats) => (stats.posts, stats.users),
        Err(e) => {
            tracing::warn!("server: failed to load stats: {:#}", e);
            (0, 0)
        }
    };

    Json(StatusResponse {
        status: "ok",
        uptime_seconds: uptime,
        posts,
        users,
    })
}

/// Build the Rocket instance, listening on all interfaces at `port`.
pub fn build_rocket(store: SqliteStore, port: u16) -> Rocket<Build> {
    let fig = rocket::Config::figment()
        .merge(("address", "0.0.0.0"))
        .merge(("port", port));

    let state = AppState {
        started_at: Utc::now(),
        store,
    };

    rocket::custom(fig)
        .manage(state)
        .mount("/", routes![index, health, status])
}

/// Runs until Rocket shuts down (SIGINT/SIGTERM).
pub async fn launch_keepalive(store: SqliteStore, port: u16) -> Result<()> {
    tracing::info!("Starting keepalive HTTP server on port {}", port);
    build_rocket(store, port)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    tracing::info!("Keepalive HTTP server has shut down");
    Ok(())
}
