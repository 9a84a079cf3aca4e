//! HTTP transport for the batch jobs.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `POST /backwards-check`, `POST /forwards-check`, `POST /backfill`:
//!   body = JSON [`Cursor`], response = [`PageReport`] for one page. A page
//!   with inconsistencies answers `409` with the report as body.
//! - `GET /health`: `{ "ok": true, "groups": [...] }`.
//!
//! ```ignore
//! let jobs = Arc::new(JobService::new(engine.clone(), engine.collection_groups()?));
//! jobs::http::serve(jobs, "0.0.0.0:3000").await?;
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use super::{run_page, CollectionGroup, Cursor, JobKind};
use crate::config::BatchConfig;
use crate::engine::Engine;
use crate::store::DocumentStore;

/// Everything a page request needs.
pub struct JobService<S> {
    engine: Arc<Engine<S>>,
    groups: Vec<CollectionGroup>,
    config: BatchConfig,
}

impl<S: DocumentStore> JobService<S> {
    pub fn new(engine: Arc<Engine<S>>, groups: Vec<CollectionGroup>) -> Self {
        Self {
            engine,
            groups,
            config: BatchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    fn page(&self, kind: JobKind, cursor: &Cursor) -> Response {
        match run_page(kind, &*self.engine, &self.groups, cursor, &self.config) {
            Ok(report) if report.inconsistencies.is_empty() => {
                (StatusCode::OK, Json(report)).into_response()
            }
            Ok(report) => (StatusCode::CONFLICT, Json(report)).into_response(),
            Err(e) => {
                let status = StatusCode::from_u16(e.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, Json(json!({ "error": e.to_string() }))).into_response()
            }
        }
    }
}

/// Build an axum `Router` serving the batch jobs.
pub fn router<S: DocumentStore + 'static>(service: Arc<JobService<S>>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/backwards-check", post(backwards_check_handler::<S>))
        .route("/forwards-check", post(forwards_check_handler::<S>))
        .route("/backfill", post(backfill_handler::<S>))
        .with_state(service)
}

/// Serve the jobs over HTTP at the given address (e.g. `"0.0.0.0:3000"`).
pub async fn serve<S: DocumentStore + 'static>(
    service: Arc<JobService<S>>,
    addr: &str,
) -> Result<(), std::io::Error> {
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health_handler<S: DocumentStore + 'static>(
    State(service): State<Arc<JobService<S>>>,
) -> impl IntoResponse {
    let groups: Vec<&str> = service.groups.iter().map(|g| g.name.as_str()).collect();
    Json(json!({ "ok": true, "groups": groups }))
}

async fn backwards_check_handler<S: DocumentStore + 'static>(
    State(service): State<Arc<JobService<S>>>,
    Json(cursor): Json<Cursor>,
) -> Response {
    service.page(JobKind::BackwardsCheck, &cursor)
}

async fn forwards_check_handler<S: DocumentStore + 'static>(
    State(service): State<Arc<JobService<S>>>,
    Json(cursor): Json<Cursor>,
) -> Response {
    service.page(JobKind::ForwardsCheck, &cursor)
}

async fn backfill_handler<S: DocumentStore + 'static>(
    State(service): State<Arc<JobService<S>>>,
    Json(cursor): Json<Cursor>,
) -> Response {
    service.page(JobKind::Backfill, &cursor)
}
