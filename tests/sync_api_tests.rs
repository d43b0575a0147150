//! Integration tests driving the REST sync surface end to end against an
//! in-process server with a real RocksDB store.

use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration as StdDuration;
use tempfile::TempDir;
use uuid::Uuid;

use syncd::models::{Address, Booking, BookingStatus, User, UserRole, Wallet};
use syncd::sync::CheckpointManager;
use syncd::{create_router, StorageEngine};

struct TestServer {
    base_url: String,
    engine: StorageEngine,
    _dir: TempDir,
}

async fn spawn_server() -> TestServer {
    let dir = TempDir::new().unwrap();
    let engine = StorageEngine::new(dir.path()).unwrap();
    let app = create_router(engine.clone(), StdDuration::from_secs(30));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        engine,
        _dir: dir,
    }
}

fn seed_user(engine: &StorageEngine, last_sync_at: DateTime<Utc>) -> Uuid {
    let id = Uuid::new_v4();
    engine
        .put_user(&User {
            id,
            email: format!("{}@example.lr", id),
            first_name: "Ama".to_string(),
            last_name: "Doe".to_string(),
            phone: "+231770000001".to_string(),
            role: UserRole::Customer,
            address: Address::default(),
            wallet: Wallet::default(),
            is_offline: false,
            version: 1,
            last_sync_at,
            created_at: last_sync_at,
            updated_at: last_sync_at,
        })
        .unwrap();
    id
}

fn seed_booking(engine: &StorageEngine, customer: Uuid, last_sync_at: DateTime<Utc>) -> Booking {
    let booking = Booking {
        id: Uuid::new_v4(),
        customer_id: customer,
        provider_id: Uuid::new_v4(),
        service_id: Uuid::new_v4(),
        status: BookingStatus::Confirmed,
        scheduled_date: last_sync_at,
        notes: String::new(),
        total_amount: 25.0,
        currency: "USD".to_string(),
        version: 1,
        last_sync_at,
        created_at: last_sync_at,
        updated_at: last_sync_at,
    };
    engine.put_booking(&booking).unwrap();
    booking
}

fn t(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, hour, 0, 0).unwrap()
}

#[tokio::test]
async fn test_delta_sync_counts_and_empty_follow_up() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let user = seed_user(&server.engine, t(0));
    for hour in [1, 2, 3] {
        seed_booking(&server.engine, user, t(hour));
    }

    // Everything since before the first change: 3 bookings + the user
    let resp = client
        .get(format!("{}/api/v1/sync/unsynced", server.base_url))
        .query(&[("since", t(0).to_rfc3339())])
        .header("X-User-Id", user.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["records_count"], 4);
    assert_eq!(body["has_more"], false);
    assert_eq!(body["data"]["bookings"].as_array().unwrap().len(), 3);

    // Nothing changed after the newest booking: user object only
    let resp = client
        .get(format!("{}/api/v1/sync/unsynced", server.base_url))
        .query(&[("since", t(3).to_rfc3339())])
        .header("X-User-Id", user.to_string())
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["records_count"], 1);
    assert_eq!(body["data"]["bookings"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_chunked_sync_pages_and_resume() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    // user + 4 bookings = 5 syncable items
    let user = seed_user(&server.engine, t(0));
    for hour in [1, 2, 3, 4] {
        seed_booking(&server.engine, user, t(hour));
    }

    let mut sizes = Vec::new();
    let mut has_more_flags = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for index in 0..3 {
        let resp = client
            .post(format!("{}/api/v1/sync/chunked", server.base_url))
            .header("X-User-Id", user.to_string())
            .json(&json!({"chunk_index": index, "chunk_size": 2}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["total_chunks"], 3);
        let data = body["data"].as_array().unwrap();
        for entity in data {
            assert!(seen.insert(entity["id"].as_str().unwrap().to_string()));
        }
        sizes.push(data.len());
        has_more_flags.push(body["has_more"].as_bool().unwrap());
        if index == 0 {
            assert_eq!(body["resume_token"], "resume_1");
        }
    }

    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(has_more_flags, vec![true, true, false]);
    assert_eq!(seen.len(), 5);
}

#[tokio::test]
async fn test_sync_up_applies_and_advances_checkpoint() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let user = seed_user(&server.engine, t(0));
    let booking = seed_booking(&server.engine, user, t(1));

    // Pull a delta to obtain a checkpoint token to acknowledge
    let delta: Value = client
        .get(format!("{}/api/v1/sync/unsynced", server.base_url))
        .query(&[("since", t(0).to_rfc3339())])
        .header("X-User-Id", user.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let checkpoint = delta["checkpoint"].as_str().unwrap().to_string();

    let mut changed = serde_json::to_value(&booking).unwrap();
    changed["notes"] = json!("gate code 4411");
    changed["kind"] = json!("booking");

    let resp = client
        .post(format!("{}/api/v1/sync/data", server.base_url))
        .header("X-User-Id", user.to_string())
        .json(&json!({
            "checkpoint": checkpoint,
            "mutations": [{
                "kind": "update",
                "expected_version": 1,
                "entity": changed,
            }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["applied"], 1);
    assert_eq!(body["conflicts"], 0);

    let stored = server.engine.get_booking(booking.id).unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.notes, "gate code 4411");

    // Acknowledging an older checkpoint afterwards must fail loudly
    let stale = CheckpointManager::issue_token(t(0) - Duration::days(1));
    let resp = client
        .post(format!("{}/api/v1/sync/data", server.base_url))
        .header("X-User-Id", user.to_string())
        .json(&json!({"checkpoint": stale, "mutations": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_conflict_reported_in_band_not_as_error() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let user = seed_user(&server.engine, t(0));
    // Server already advanced this booking to version 3
    let mut booking = seed_booking(&server.engine, user, t(1));
    booking.version = 3;
    server.engine.put_booking(&booking).unwrap();

    let mut stale = serde_json::to_value(&booking).unwrap();
    stale["kind"] = json!("booking");
    stale["version"] = json!(2);
    stale["notes"] = json!("edited while offline");

    let resp = client
        .post(format!("{}/api/v1/sync/data", server.base_url))
        .header("X-User-Id", user.to_string())
        .json(&json!({
            "checkpoint": CheckpointManager::issue_token(Utc::now()),
            "mutations": [{
                "kind": "update",
                "expected_version": 2,
                "entity": stale,
            }],
        }))
        .send()
        .await
        .unwrap();

    // Conflicts are data, not an error status
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["conflicts"], 1);
    assert_eq!(body["results"][0]["outcome"], "quarantined");
    assert_eq!(body["results"][0]["server_version"], 3);

    // Store untouched, exactly one conflict queued
    let stored = server.engine.get_booking(booking.id).unwrap().unwrap();
    assert_eq!(stored.version, 3);
    assert_eq!(stored.notes, "");

    let conflicts: Value = client
        .get(format!(
            "{}/api/v1/sync/queue/conflicts",
            server.base_url
        ))
        .header("X-User-Id", user.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = conflicts.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["conflict"]["client_version"], 2);
    assert_eq!(items[0]["conflict"]["server_version"], 3);
}

#[tokio::test]
async fn test_queue_endpoints_and_cleanup() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let user = seed_user(&server.engine, t(0));

    // Two queued offline mutations with different priorities
    for (priority, note) in [(1, "low"), (9, "high")] {
        let resp = client
            .post(format!("{}/api/v1/sync/queue", server.base_url))
            .header("X-User-Id", user.to_string())
            .json(&json!({"type": "update", "priority": priority, "payload": {"note": note}}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let pending: Value = client
        .get(format!("{}/api/v1/sync/queue/pending", server.base_url))
        .header("X-User-Id", user.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = pending.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["priority"], 9);
    assert_eq!(items[1]["priority"], 1);

    // Complete the urgent one and age its completion stamp past retention
    let urgent_id = items[0]["id"].as_str().unwrap();
    let resp = client
        .post(format!(
            "{}/api/v1/sync/queue/{}/complete",
            server.base_url, urgent_id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let mut completed = server
        .engine
        .get_queue_item(urgent_id.parse().unwrap())
        .unwrap()
        .unwrap();
    completed.completed_at = Some(Utc::now() - Duration::hours(48));
    server.engine.put_queue_item(&completed).unwrap();

    let cleanup: Value = client
        .post(format!("{}/api/v1/sync/queue/cleanup", server.base_url))
        .header("X-User-Id", user.to_string())
        .json(&json!({"older_than_hours": 24}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleanup["removed"], 1);

    // The pending item survived the sweep
    let pending: Value = client
        .get(format!("{}/api/v1/sync/queue/pending", server.base_url))
        .header("X-User-Id", user.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_background_status_defaults_and_toggle() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let user = seed_user(&server.engine, t(0));

    let status: Value = client
        .get(format!(
            "{}/api/v1/sync/background/status",
            server.base_url
        ))
        .header("X-User-Id", user.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["is_enabled"], true);
    assert_eq!(status["auto_retry_enabled"], true);
    assert_eq!(status["pending_items"], 0);

    let mut updated = status.clone();
    updated["is_enabled"] = json!(false);
    let resp = client
        .put(format!(
            "{}/api/v1/sync/background/status",
            server.base_url
        ))
        .header("X-User-Id", user.to_string())
        .json(&updated)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let status: Value = client
        .get(format!(
            "{}/api/v1/sync/background/status",
            server.base_url
        ))
        .header("X-User-Id", user.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["is_enabled"], false);
}

#[tokio::test]
async fn test_validation_and_identity_errors() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let user = seed_user(&server.engine, t(0));

    // Missing caller identity
    let resp = client
        .get(format!("{}/api/v1/sync/unsynced", server.base_url))
        .query(&[("since", t(0).to_rfc3339())])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Unknown user
    let resp = client
        .get(format!("{}/api/v1/sync/unsynced", server.base_url))
        .query(&[("since", t(0).to_rfc3339())])
        .header("X-User-Id", Uuid::new_v4().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Invalid chunk size
    let resp = client
        .post(format!("{}/api/v1/sync/chunked", server.base_url))
        .header("X-User-Id", user.to_string())
        .json(&json!({"chunk_index": 0, "chunk_size": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_recorded_per_sync() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let user = seed_user(&server.engine, t(0));
    seed_booking(&server.engine, user, t(1));

    for _ in 0..2 {
        client
            .get(format!("{}/api/v1/sync/unsynced", server.base_url))
            .query(&[("since", t(0).to_rfc3339())])
            .header("X-User-Id", user.to_string())
            .send()
            .await
            .unwrap();
    }

    let metrics: Value = client
        .get(format!(
            "{}/api/v1/sync/metrics?limit=10",
            server.base_url
        ))
        .header("X-User-Id", user.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = metrics.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    // Each delta counted the booking plus the user object
    assert_eq!(entries[0]["records_count"], 2);
    assert_eq!(entries[0]["data_size"], 2048);
}

#[tokio::test]
async fn test_delta_sync_accepts_unencoded_offset_timestamp() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let user = seed_user(&server.engine, t(0));
    seed_booking(&server.engine, user, t(1));

    // A literal `+00:00` in the query string form-decodes to a space on the
    // server; the endpoint must still read it as a UTC offset.
    let since = t(0).to_rfc3339();
    assert!(since.ends_with("+00:00"));
    let resp = client
        .get(format!(
            "{}/api/v1/sync/unsynced?since={}",
            server.base_url, since
        ))
        .header("X-User-Id", user.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["records_count"], 2);
}

#[tokio::test]
async fn test_sync_up_reports_failed_mutation_in_band() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();
    let user = seed_user(&server.engine, t(0));
    let booking = seed_booking(&server.engine, user, t(1));

    let mut user_entity = serde_json::to_value(
        server.engine.get_user(user).unwrap().unwrap(),
    )
    .unwrap();
    user_entity["kind"] = json!("user");

    let mut changed = serde_json::to_value(&booking).unwrap();
    changed["kind"] = json!("booking");
    changed["notes"] = json!("bring spare keys");

    let resp = client
        .post(format!("{}/api/v1/sync/data", server.base_url))
        .header("X-User-Id", user.to_string())
        .json(&json!({
            "checkpoint": CheckpointManager::issue_token(Utc::now()),
            "mutations": [
                // Deleting the user record is never allowed
                {"kind": "delete", "expected_version": 1, "entity": user_entity},
                {"kind": "update", "expected_version": 1, "entity": changed},
            ],
        }))
        .send()
        .await
        .unwrap();

    // One bad mutation does not sink the batch or the acknowledgement
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["failed"], 1);
    assert_eq!(body["applied"], 1);
    assert_eq!(body["conflicts"], 0);
    assert_eq!(body["results"][0]["outcome"], "failed");
    assert_eq!(body["results"][1]["outcome"], "applied");

    assert!(server.engine.get_user(user).unwrap().is_some());
    let stored = server.engine.get_booking(booking.id).unwrap().unwrap();
    assert_eq!(stored.version, 2);
    assert_eq!(stored.notes, "bring spare keys");
}
