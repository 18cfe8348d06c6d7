//! Integration tests: task lifecycle over HTTP, audit capture, actor layer, audit endpoints.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use office_api::config::default_users;
use office_api::server::{self, AppState, Backends};
use office_audit::export::parse_export;
use office_store::InMemoryUserDirectory;
use office_types::{AuditAction, AuditEntityType, AuditFilter, AuditLog, AuditStore, Role, User};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

const ADMIN: u64 = 1;
const LEADER: u64 = 2;
const SECRETARY: u64 = 4;
const OFFICER: u64 = 5;
const RETIRED: u64 = 9;

struct TestApp {
    app: axum::Router,
    audit_log: Arc<dyn AuditStore + Send + Sync>,
}

fn test_app() -> TestApp {
    let mut users = default_users();
    users.push(User {
        id: RETIRED,
        name: "Retired Officer".into(),
        role: Role::Officer,
        is_active: false,
    });
    let backends = Backends::in_memory(InMemoryUserDirectory::with_users(users));
    let audit_log = Arc::clone(&backends.audit_log);
    let state = Arc::new(AppState::new(backends, 365));
    TestApp {
        app: server::router(state),
        audit_log,
    }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, user: Option<u64>, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header("user-agent", "integration-test")
            .header("x-forwarded-for", "203.0.113.7");
        if let Some(user) = user {
            req = req.header("x-user-id", user.to_string());
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = self.app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn json(&self, method: &str, uri: &str, user: u64, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.send(method, uri, Some(user), body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn audit_rows(&self) -> Vec<AuditLog> {
        self.audit_log.scan(&AuditFilter::default()).await.unwrap()
    }
}

#[tokio::test]
async fn health_needs_no_actor() {
    let t = test_app();
    let (status, body) = t.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn create_assign_submit_complete() {
    let t = test_app();

    let (status, task) = t
        .json(
            "POST",
            "/api/tasks",
            SECRETARY,
            Some(json!({"description": "Prepare quarterly report", "deadline": "2099-01-01"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["status"], "not_started");
    assert_eq!(task["status_history"][0]["old_status"], "");
    let id = task["id"].as_u64().unwrap();

    let (status, task) = t
        .json("PUT", &format!("/api/tasks/{id}/assign"), LEADER, Some(json!({"assigned_to": OFFICER})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "processing");

    let (status, task) = t
        .json("PUT", &format!("/api/tasks/{id}/submit-review"), OFFICER, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "review");
    assert_eq!(task["assigned_to"], LEADER);

    let (status, task) = t
        .json(
            "PUT",
            &format!("/api/tasks/{id}/status"),
            LEADER,
            Some(json!({"status": "completed"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "completed");
    assert!(task["completion_date"].is_string());

    let history = task["status_history"].as_array().unwrap();
    let sequence: Vec<&str> = history
        .iter()
        .map(|h| h["new_status"].as_str().unwrap())
        .collect();
    assert_eq!(sequence, ["not_started", "processing", "review", "completed"]);

    let rows = t.audit_rows().await;
    let actions: Vec<AuditAction> = rows.iter().map(|r| r.action).collect();
    assert_eq!(
        actions,
        [
            AuditAction::TaskCreate,
            AuditAction::TaskAssign,
            AuditAction::TaskUpdate,
            AuditAction::TaskUpdate
        ]
    );
    assert!(rows.iter().all(|r| r.success));
    assert!(rows.iter().all(|r| r.entity_type == AuditEntityType::Task && r.entity_id == id));
    assert_eq!(rows[0].user_id, SECRETARY);
    assert_eq!(rows[0].ip_address, "203.0.113.7");
    assert_eq!(rows[0].description, "Created new task");
    assert_eq!(rows[2].description, "Submitted task for review");
    assert!(rows[1].new_values.contains("assigned_to"));

    let (status, workflow) = t
        .json("GET", &format!("/api/tasks/{id}/workflow"), LEADER, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(workflow["progress"], 100);
    assert_eq!(t.audit_rows().await.len(), 4);
}

#[tokio::test]
async fn rejected_mutation_writes_one_failed_row() {
    let t = test_app();
    let (status, body) = t
        .json("POST", "/api/tasks", OFFICER, Some(json!({"description": "not allowed"})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let message = body["error"].as_str().unwrap().to_string();

    let rows = t.audit_rows().await;
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].success);
    assert_eq!(rows[0].action, AuditAction::TaskCreate);
    assert_eq!(rows[0].entity_id, 0);
    assert_eq!(rows[0].error_message.as_deref(), Some(message.as_str()));
    assert!(rows[0].new_values.is_empty());
    assert!(rows[0].metadata.contains("\"status_code\":403"));
}

#[tokio::test]
async fn oversized_request_body_writes_one_failed_row() {
    let t = test_app();
    let description = "x".repeat(5 * 1024 * 1024);
    let (status, _) = t
        .send("POST", "/api/tasks", Some(SECRETARY), Some(json!({ "description": description })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let rows = t.audit_rows().await;
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].success);
    assert_eq!(rows[0].action, AuditAction::TaskCreate);
    assert_eq!(rows[0].user_id, SECRETARY);
    assert!(rows[0]
        .error_message
        .as_deref()
        .unwrap()
        .starts_with("failed to read request body"));
    assert!(rows[0].metadata.contains("\"status_code\":400"));
}

#[tokio::test]
async fn unknown_enum_value_is_bad_request() {
    let t = test_app();
    let (_, task) = t
        .json("POST", "/api/tasks", SECRETARY, Some(json!({"description": "x"})))
        .await;
    let id = task["id"].as_u64().unwrap();

    let (status, body) = t
        .json(
            "PUT",
            &format!("/api/tasks/{id}/status"),
            LEADER,
            Some(json!({"status": "archived"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = t
        .json("GET", "/api/audit/logs?action=task_explode", ADMIN, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let failed: Vec<AuditLog> = t.audit_rows().await.into_iter().filter(|r| !r.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].entity_id, id);
}

#[tokio::test]
async fn actor_layer_rejects_unknown_and_inactive_users() {
    let t = test_app();
    let (status, _) = t.send("GET", "/api/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.send("GET", "/api/tasks", Some(77), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t.json("POST", "/api/tasks", RETIRED, Some(json!({"description": "x"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("inactive"));

    assert!(t.audit_rows().await.is_empty());
}

#[tokio::test]
async fn reads_are_not_audited() {
    let t = test_app();
    t.json("POST", "/api/tasks", SECRETARY, Some(json!({"description": "x"}))).await;
    t.json("GET", "/api/tasks", SECRETARY, None).await;
    t.json("GET", "/api/tasks/1", SECRETARY, None).await;
    t.json("GET", "/api/audit/logs", ADMIN, None).await;
    assert_eq!(t.audit_rows().await.len(), 1);
}

#[tokio::test]
async fn audit_logs_and_trail() {
    let t = test_app();
    for i in 0..3 {
        t.json("POST", "/api/tasks", SECRETARY, Some(json!({"description": format!("task {i}")})))
            .await;
    }

    let (status, page) = t.json("GET", "/api/audit/logs?page=1&limit=2", ADMIN, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["pagination"]["total_items"], 3);
    assert_eq!(page["pagination"]["total_pages"], 2);
    assert_eq!(page["items"][0]["entity_id"], 3);

    let (status, trail) = t.json("GET", "/api/audit/trail/task/2", LEADER, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trail["items"].as_array().unwrap().len(), 1);

    let (status, _) = t.json("GET", "/api/audit/logs", OFFICER, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn summary_and_statistics() {
    let t = test_app();
    let (_, task) = t
        .json("POST", "/api/tasks", LEADER, Some(json!({"description": "summarize me"})))
        .await;
    let id = task["id"].as_u64().unwrap();
    t.json("PUT", &format!("/api/tasks/{id}/assign"), LEADER, Some(json!({"assigned_to": OFFICER})))
        .await;

    let (status, summary) = t
        .json("GET", "/api/audit/summary?entity_type=task", LEADER, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let row = &summary["items"][0];
    assert_eq!(row["entity_id"], id);
    assert_eq!(row["created_by"], "Team Leader");
    assert_eq!(row["owner"], "Officer");
    assert_eq!(row["total_activities"], 2);

    let (status, _) = t
        .json("GET", "/api/audit/summary?entity_type=user", LEADER, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = t.json("GET", "/api/audit/summary", LEADER, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, stats) = t.json("GET", "/api/audit/statistics", ADMIN, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_activities"], 2);
    assert_eq!(stats["user_statistics"][0]["user_name"], "Team Leader");
}

#[tokio::test]
async fn export_returns_csv() {
    let t = test_app();
    t.json("POST", "/api/tasks", SECRETARY, Some(json!({"description": "export me"}))).await;

    let req = Request::builder()
        .method("GET")
        .uri("/api/audit/export")
        .header("x-user-id", ADMIN.to_string())
        .body(Body::empty())
        .unwrap();
    let res = t.app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/csv");
    let disposition = res.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=audit_logs_"));
    assert!(disposition.ends_with(".csv"));

    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let rows = parse_export(&bytes).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user, "Secretary");
    assert_eq!(rows[0].action, "task_create");
    assert!(rows[0].success);
}

#[tokio::test]
async fn cleanup_is_admin_only_with_minimum_retention() {
    let t = test_app();

    let (status, _) = t.json("DELETE", "/api/audit/cleanup?days=60", LEADER, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t.json("DELETE", "/api/audit/cleanup?days=7", ADMIN, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("30"));

    let (status, body) = t.json("DELETE", "/api/audit/cleanup", ADMIN, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["days_to_keep"], 365);
    assert_eq!(body["deleted"], 0);

    let rows = t.audit_rows().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].action, AuditAction::SystemConfig);
    assert_eq!(rows[0].entity_type, AuditEntityType::System);
    assert!(rows[0].metadata.contains("days_to_keep"));
}

#[tokio::test]
async fn cleanup_with_huge_retention_deletes_nothing() {
    let t = test_app();
    let (status, _) = t
        .json("POST", "/api/tasks", SECRETARY, Some(json!({"description": "kept"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = t.json("DELETE", "/api/audit/cleanup?days=60", OFFICER, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .json("DELETE", "/api/audit/cleanup?days=4294967295", ADMIN, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 0);
    assert_eq!(body["days_to_keep"], 4294967295u64);

    let rows = t.audit_rows().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].action, AuditAction::TaskCreate);
    assert_eq!(rows[1].action, AuditAction::SystemConfig);
}
