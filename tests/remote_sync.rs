//! Library-level sync tests against a mock remote store.

use std::time::Duration;

use boardsync::client::BoardSync;
use boardsync::config::Config;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn open(server: &MockServer, dir: &TempDir) -> BoardSync {
    let config = Config {
        api_base: server.uri(),
        request_timeout: Duration::from_secs(5),
        refresh_interval: Duration::from_secs(3600),
        cache_path: dir.path().join("cache.db"),
        debug_http: false,
    };
    BoardSync::open(&config).unwrap()
}

fn roadmap(task_title: &str) -> serde_json::Value {
    json!([{
        "id": 7,
        "name": "Roadmap",
        "ownerId": 42,
        "members": [{"id": "u2", "name": "Bob"}],
        "columns": [
            {"id": "c1", "title": "Todo", "tasks": [{"id": "t1", "title": task_title}]},
            {"id": "c2", "name": "Done"}
        ]
    }])
}

#[tokio::test]
async fn test_remote_login_authorizes_later_fetches() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_partial_json(json!({"email": "dana@example.com"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "t-1",
            "user": {"id": 42, "name": "Dana", "email": "dana@example.com"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/boards"))
        .and(header("authorization", "Bearer t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(roadmap("Ship")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = open(&server, &dir);
    let outcome = client.session.login("dana@example.com", "secret").await;
    assert!(outcome.ok);
    // Let the refresh loops started by login finish their first pass.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let report = client.sync().await;
    assert!(report.is_complete());

    let boards = client.boards.boards_for_user("42");
    assert_eq!(boards.len(), 1);
    let board = &boards[0];
    assert_eq!(board.id, "7");
    assert!(board.member_ids.contains("u2"));
    assert_eq!(board.column("c1").unwrap().task_ids, vec!["t1".to_string()]);
    assert_eq!(board.column("c2").unwrap().title, "Done");
}

#[tokio::test]
async fn test_remote_create_refetches_server_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/boards"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/boards"))
        .respond_with(ResponseTemplate::new(200).set_body_json(roadmap("Ship")))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = open(&server, &dir);
    let id = client.boards.create_board("Roadmap", "42").await;

    assert_eq!(id, "7");
    let board = client.boards.board_by_id("7").unwrap();
    assert_eq!(board.tasks["t1"].title, "Ship");
}

#[tokio::test]
async fn test_server_error_keeps_last_good_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/boards"))
        .respond_with(ResponseTemplate::new(200).set_body_json(roadmap("Ship")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/boards"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "boom"})))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = open(&server, &dir);
    assert!(client.boards.fetch_remote().await);
    assert!(!client.boards.fetch_remote().await);

    assert_eq!(client.boards.boards().len(), 1);

    // A fresh client over the same cache sees the same snapshot.
    drop(client);
    let reopened = open(&server, &dir);
    assert_eq!(reopened.boards.board_by_id("7").unwrap().name, "Roadmap");
}

#[tokio::test]
async fn test_remote_rename_task_reflects_refetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/boards"))
        .respond_with(ResponseTemplate::new(200).set_body_json(roadmap("Ship")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/boards/7/tasks/t1"))
        .and(body_partial_json(json!({"title": "Ship it"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/boards"))
        .respond_with(ResponseTemplate::new(200).set_body_json(roadmap("Ship it (server)")))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = open(&server, &dir);
    assert!(client.boards.fetch_remote().await);

    let resolution = client.boards.rename_task("7", "t1", "Ship it").await;
    assert!(resolution.is_remote());
    assert_eq!(
        client.boards.board_by_id("7").unwrap().tasks["t1"].title,
        "Ship it (server)"
    );
}

#[tokio::test]
async fn test_mark_all_read_uses_remote_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "userId": "u1", "message": "hello", "createdAt": 1000, "read": false}
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/notifications/read-all"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "userId": "u1", "message": "hello", "createdAt": 1000, "read": true}
        ])))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = open(&server, &dir);
    assert!(client.notifications.fetch().await);
    assert_eq!(client.notifications.unread_count("u1"), 1);

    client.notifications.mark_all_read("u1").await;
    assert_eq!(client.notifications.unread_count("u1"), 0);
}
