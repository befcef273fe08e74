//! E2E tests for the friends' activity feed

mod common;

use chrono::{Duration, Utc};
use common::TestServer;
use serde_json::Value;

async fn feed(server: &TestServer, user_id: &str) -> Vec<Value> {
    let response = server.get_as(user_id, "/api/feed").send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    body["feed_items"].as_array().unwrap().clone()
}

/// A moment inside today's UTC day
fn earlier_today() -> chrono::DateTime<Utc> {
    let now = Utc::now();
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc();
    midnight + (now - midnight) / 2
}

#[tokio::test]
async fn test_friend_meeting_water_goal_appears() {
    let server = TestServer::new().await;
    server.create_user("alice", "Alice", "Liddell").await;
    server.create_user("bob", "Bob", "Builder").await;
    server.befriend("alice", "bob").await;

    server
        .state
        .db
        .record_water_intake("bob", 2500.0, earlier_today())
        .await
        .unwrap();

    let items = feed(&server, "alice").await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["user_id"], "bob");
    assert_eq!(items[0]["user_name"], "Bob Builder");
    assert_eq!(items[0]["activity_type"], "water_goal");
    assert_eq!(items[0]["activity_data"]["goal_met"], true);
}

#[tokio::test]
async fn test_friend_below_goal_is_absent() {
    let server = TestServer::new().await;
    server.create_user("alice", "Alice", "Liddell").await;
    server.create_user("bob", "Bob", "Builder").await;
    server.befriend("alice", "bob").await;

    server
        .state
        .db
        .record_water_intake("bob", 1500.0, earlier_today())
        .await
        .unwrap();
    // yesterday's water does not count towards today
    server
        .state
        .db
        .record_water_intake("bob", 1500.0, Utc::now() - Duration::days(2))
        .await
        .unwrap();

    assert!(feed(&server, "alice").await.is_empty());
}

#[tokio::test]
async fn test_non_friends_are_not_in_feed() {
    let server = TestServer::new().await;
    server.create_user("alice", "Alice", "Liddell").await;
    server.create_user("carol", "Carol", "Singer").await;

    server
        .state
        .db
        .record_water_intake("carol", 5000.0, earlier_today())
        .await
        .unwrap();

    assert!(feed(&server, "alice").await.is_empty());
}

#[tokio::test]
async fn test_step_goal_when_enabled() {
    let server = TestServer::with_config(|config| config.feed.step_check_enabled = true).await;
    server.create_user("alice", "Alice", "Liddell").await;
    server.create_user("bob", "Bob", "Builder").await;
    server.befriend("alice", "bob").await;

    server
        .state
        .db
        .record_steps("bob", 12_000, earlier_today())
        .await
        .unwrap();

    let items = feed(&server, "alice").await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["activity_type"], "step_goal");
}
