//! HTTP roundtrip for the batch job endpoints.

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;

use serde_json::{json, Value};
use sourced_views::jobs::http::{router, JobService};
use sourced_views::store::Transaction;
use sourced_views::{BatchConfig, Cursor, DocumentStore, Key, PageReport, StoreError};
use tokio::net::TcpListener;

use support::{engine, join};

async fn serve() -> (String, Arc<sourced_views::Engine<sourced_views::InMemoryDocumentStore>>) {
    let engine = Arc::new(engine());
    join(&engine, "g1", "alice").unwrap();
    join(&engine, "g1", "bob").unwrap();

    let groups = engine.collection_groups().unwrap();
    let service = Arc::new(
        JobService::new(Arc::clone(&engine), groups)
            .with_config(BatchConfig::default().with_page_size(10)),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(service)).await.unwrap();
    });
    (format!("http://{}", addr), engine)
}

#[tokio::test]
async fn health_lists_groups() {
    let (base, _engine) = serve().await;
    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["groups"], json!(["seats", "gamesByPlayer", "playerGameCount"]));
}

#[tokio::test]
async fn forwards_check_pages_to_completion() {
    let (base, _engine) = serve().await;
    let client = reqwest::Client::new();

    let mut cursor = Cursor::start();
    let mut processed = 0;
    while !cursor.done {
        let resp = client
            .post(format!("{}/forwards-check", base))
            .json(&cursor)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let report: PageReport = resp.json().await.unwrap();
        processed += report.processed;
        cursor = report.cursor;
    }
    // Two persisted seats, the same two exported, then two counts.
    assert_eq!(processed, 6);
}

#[tokio::test]
async fn drift_answers_conflict_and_backfill_repairs_missing_rows() {
    let (base, engine) = serve().await;
    let path = engine
        .export_path("gamesByPlayer")
        .unwrap()
        .doc_path(&Key::from(["bob", "g1"]))
        .unwrap();
    engine
        .store()
        .transaction(|tx: &mut dyn Transaction| -> Result<(), StoreError> { tx.delete(path) })
        .unwrap();

    // Group 1 is the gamesByPlayer export; group 0 is the seats sort.
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/forwards-check", base))
        .json(&json!({ "group": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let report: PageReport = resp.json().await.unwrap();
    assert_eq!(report.inconsistencies.len(), 1);

    let resp = client
        .post(format!("{}/backfill", base))
        .json(&json!({ "group": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let report: PageReport = resp.json().await.unwrap();
    assert_eq!(report.written, 1);
}

#[tokio::test]
async fn bad_cursor_is_a_client_error() {
    let (base, _engine) = serve().await;
    let resp = reqwest::Client::new()
        .post(format!("{}/backwards-check", base))
        .json(&json!({ "group": 42 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}
