//! HTTP API tests: the router is served on an ephemeral port and called over
//! real HTTP.

mod common;

use chrono::Utc;
use common::{imap_config, raw_message, test_pool, MemoryMailbox};
use crm_inbox::config::Config;
use crm_inbox::inbox::{insert_message, InsertOutcome};
use crm_inbox::parse::parse_message;
use crm_inbox::resolve::Relations;
use crm_inbox::server::{router, AppState};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

struct TestServer {
    base: String,
    client: reqwest::Client,
    pool: SqlitePool,
    _tmp: TempDir,
}

async fn start(with_imap: bool, mailbox: MemoryMailbox) -> TestServer {
    let (tmp, mut config, pool) = test_pool().await;
    if with_imap {
        config.imap = Some(imap_config());
    }
    serve(config, pool, mailbox, tmp).await
}

async fn serve(config: Config, pool: SqlitePool, mailbox: MemoryMailbox, tmp: TempDir) -> TestServer {
    let state = AppState::new(config, pool.clone(), Arc::new(mailbox));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        pool,
        _tmp: tmp,
    }
}

async fn seed(pool: &SqlitePool, id: &str, subject: &str, day: u32) -> String {
    let raw = raw_message(id, "\"Jane\" <jane@acme.com>", subject, day, "body text");
    let message = parse_message(&raw, Utc::now()).unwrap();
    match insert_message(pool, &message, &Relations::default())
        .await
        .unwrap()
    {
        InsertOutcome::Inserted(id) => id,
        InsertOutcome::Duplicate => panic!("seeded twice: {}", id),
    }
}

#[tokio::test]
async fn test_health() {
    let server = start(false, MemoryMailbox::new(Vec::new())).await;
    let resp = server
        .client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_list_get_and_status_changes() {
    let server = start(false, MemoryMailbox::new(Vec::new())).await;
    seed(&server.pool, "old@mail", "Older", 1).await;
    let newer = seed(&server.pool, "new@mail", "Newer", 3).await;

    let body: Value = server
        .client
        .get(format!("{}/emails", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 2);
    assert_eq!(body["emails"][0]["subject"], "Newer");
    assert_eq!(body["emails"][0]["sender_display"], "Jane <jane@acme.com>");
    assert_eq!(body["emails"][0]["status"], "unread");

    let resp = server
        .client
        .patch(format!("{}/emails/{}/mark-read", server.base, newer))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let one: Value = server
        .client
        .get(format!("{}/emails/{}", server.base, newer))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(one["status"], "read");
    assert_eq!(one["message_id"], "new@mail");

    let unread: Value = server
        .client
        .get(format!("{}/emails?status=unread", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(unread["count"], 1);
    assert_eq!(unread["emails"][0]["subject"], "Older");

    let archived = server
        .client
        .patch(format!("{}/emails/{}/archive", server.base, newer))
        .send()
        .await
        .unwrap();
    let archived: Value = archived.json().await.unwrap();
    assert_eq!(archived["status"], "archived");

    let found: Value = server
        .client
        .get(format!("{}/emails?search=OLDER", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["count"], 1);
}

#[tokio::test]
async fn test_error_envelope() {
    let server = start(false, MemoryMailbox::new(Vec::new())).await;

    let resp = server
        .client
        .get(format!("{}/emails/missing", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = server
        .client
        .patch(format!("{}/emails/missing/mark-unread", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = server
        .client
        .get(format!("{}/emails?status=deleted", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_fetch_endpoint() {
    let mailbox = MemoryMailbox::new(vec![
        raw_message("a@mail", "a@example.net", "A", 1, "a"),
        raw_message("b@mail", "b@example.net", "B", 2, "b"),
        raw_message("c@mail", "c@example.net", "C", 3, "c"),
    ]);
    let server = start(true, mailbox.clone()).await;

    let resp = server
        .client
        .post(format!("{}/emails/fetch", server.base))
        .json(&json!({ "limit": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["fetched_count"], 2);
    assert_eq!(body["saved_count"], 2);
    assert_eq!(mailbox.log().fetched, vec![3, 2]);

    // empty body falls back to the configured folder and limit
    let resp = server
        .client
        .post(format!("{}/emails/fetch", server.base))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["fetched_count"], 3);
    assert_eq!(body["saved_count"], 1);
}

#[tokio::test]
async fn test_fetch_failures_are_bad_requests() {
    let server = start(false, MemoryMailbox::new(Vec::new())).await;
    let resp = server
        .client
        .post(format!("{}/emails/fetch", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let server = start(true, MemoryMailbox::refusing_login()).await;
    let resp = server
        .client
        .post(format!("{}/emails/fetch", server.base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("IMAP connection failed"));
}

#[tokio::test]
async fn test_imap_status_endpoint() {
    let server = start(false, MemoryMailbox::new(Vec::new())).await;
    let body: Value = server
        .client
        .get(format!("{}/emails/imap-status", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["has_imap_config"], false);
    assert_eq!(body["ready_to_fetch"], false);

    let server = start(true, MemoryMailbox::new(Vec::new())).await;
    let body: Value = server
        .client
        .get(format!("{}/emails/imap-status", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["ready_to_fetch"], true);
    assert_eq!(body["missing_fields"], json!([]));
}
