use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::{Json, Router, routing::get};
use sea_orm_migration::MigratorTrait;
use serde::Serialize;

use huddle_server::api;
use huddle_server::cache::MemoryCache;
use huddle_server::email;
use huddle_server::hub::Hub;
use huddle_server::jobs::TokioJobQueue;
use huddle_server::mailer::{LogMailer, Mailer};
use huddle_server::retention;
use huddle_server::scheduler::Scheduler;
use huddle_server::state::AppState;
use huddle_server::ws;

#[derive(Debug, Serialize)]
struct HealthzResponse {
    status: &'static str,
    version: &'static str,
    database: bool,
    rooms: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthzResponse> {
    let database = state.db.ping().await.is_ok();
    Json(HealthzResponse {
        status: if database { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        database,
        rooms: state.hub.room_count().await,
    })
}

async fn init_db_and_migrate() -> anyhow::Result<Arc<sea_orm::DatabaseConnection>> {
    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?;
    let db = huddle_db::connect(&database_url).await?;

    // Apply migrations on boot (idempotent).
    huddle_migration::Migrator::up(&db, None).await?;

    Ok(Arc::new(db))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let db = init_db_and_migrate().await?;

    let (jobs, mut runner) = TokioJobQueue::new();
    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);
    email::register_handlers(&mut runner, db.clone(), mailer);
    retention::register_handler(&mut runner, db.clone());
    runner.spawn();

    let state = AppState {
        db,
        hub: Hub::default(),
        cache: Arc::new(MemoryCache::new()),
        jobs,
    };

    Scheduler::from_env(state.jobs.clone()).spawn();

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/ws/notifications", get(ws::notifications_ws))
        .route("/ws/tasks/:task_id", get(ws::task_ws))
        .route("/ws/feed", get(ws::feed_ws))
        .merge(api::router())
        .with_state(state);

    let addr: SocketAddr = ([0, 0, 0, 0], 8080).into();
    tracing::info!(%addr, "huddle-server HTTP listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
