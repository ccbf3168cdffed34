//! HTTP API tests.
//!
//! Requests run through the full router (CORS and tracing layers included)
//! against an in-memory database.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use garage_ledger::api::{AppState, build_router};
use garage_ledger::config::AdminConfig;
use garage_ledger::db::Database;
use garage_ledger::realtime::{Broadcaster, Notifier};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_PASSWORD: &str = "secret";

struct TestApp {
    router: Router,
    db: Database,
    broadcaster: Arc<Broadcaster>,
}

fn setup_app() -> TestApp {
    let db = Database::open_in_memory().expect("Failed to create in-memory database");
    let broadcaster = Arc::new(Broadcaster::new(64));
    let state = AppState::new(
        db.clone(),
        broadcaster.clone(),
        AdminConfig {
            password: Some(ADMIN_PASSWORD.to_string()),
        },
    )
    .with_allowed_origins(vec!["http://localhost:3000".to_string()]);

    TestApp {
        router: build_router(Arc::new(state)),
        db,
        broadcaster,
    }
}

impl TestApp {
    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Send `body` verbatim with a JSON content type.
    async fn send_text(&self, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body)).await
    }

    async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(body)).await
    }

    async fn create_car(&self) -> i64 {
        let (status, car) = self
            .post("/api/cars", json!({ "brand": "Ford", "model": "Focus", "year": 2015 }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        car["id"].as_i64().unwrap()
    }

    async fn create_mechanic(&self, name: &str) {
        let (status, _) = self.post("/api/mechanics", json!({ "name": name })).await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_ok() {
        let app = setup_app();
        let (status, body) = app.get("/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn stats_start_empty() {
        let app = setup_app();
        let (status, body) = app.get("/api/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_cars"], 0);
        assert_eq!(body["total_tasks"], 0);
    }
}

mod task_tests {
    use super::*;

    #[tokio::test]
    async fn create_complete_and_reopen_task() {
        let app = setup_app();
        let car_id = app.create_car().await;
        app.create_mechanic("Alice").await;
        app.create_mechanic("Bob").await;

        let (status, task) = app
            .post(
                "/api/tasks",
                json!({ "car_id": car_id, "title": "Oil change", "points": 4 }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(task["status"], "pending");
        let uri = format!("/api/tasks/{}", task["id"]);

        let (status, task) = app
            .put(
                &uri,
                json!({ "status": "completed", "assigned_mechanic": "Alice,Bob" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["status"], "completed");

        let (_, alice) = app.get("/api/mechanics/Alice").await;
        assert_eq!(alice["total_points"], 2.0);
        assert_eq!(alice["total_tasks"], 1);

        let (status, _) = app.put(&uri, json!({ "status": "pending" })).await;
        assert_eq!(status, StatusCode::OK);
        let (_, bob) = app.get("/api/mechanics/Bob").await;
        assert_eq!(bob["total_points"], 0.0);
        assert_eq!(bob["total_tasks"], 0);
    }

    #[tokio::test]
    async fn create_task_rejects_unknown_car() {
        let app = setup_app();
        let (status, body) = app
            .post("/api/tasks", json!({ "car_id": 123, "title": "Nothing" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_FIELD_VALUE");
    }

    #[tokio::test]
    async fn empty_update_is_bad_request() {
        let app = setup_app();
        let car_id = app.create_car().await;
        let (_, task) = app
            .post("/api/tasks", json!({ "car_id": car_id, "title": "Wipers" }))
            .await;

        let (status, body) = app
            .put(&format!("/api/tasks/{}", task["id"]), json!({}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "NO_FIELDS_TO_UPDATE");
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let app = setup_app();
        let (status, _) = app.get("/api/tasks/77").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.put("/api/tasks/77", json!({ "title": "x" })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.send(Method::DELETE, "/api/tasks/77", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_task_returns_id() {
        let app = setup_app();
        let car_id = app.create_car().await;
        let (_, task) = app
            .post("/api/tasks", json!({ "car_id": car_id, "title": "Horn" }))
            .await;

        let (status, body) = app
            .send(Method::DELETE, &format!("/api/tasks/{}", task["id"]), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], task["id"]);
    }

    #[tokio::test]
    async fn priority_list_only_has_open_priority_tasks() {
        let app = setup_app();
        let car_id = app.create_car().await;
        app.post("/api/tasks", json!({ "car_id": car_id, "title": "Routine" }))
            .await;
        let (_, urgent) = app
            .post(
                "/api/tasks",
                json!({ "car_id": car_id, "title": "Brakes failing", "is_priority": true }),
            )
            .await;

        let (status, body) = app.get("/api/tasks/priority/list").await;
        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["id"], urgent["id"]);
    }
}

mod punch_tests {
    use super::*;

    #[tokio::test]
    async fn double_punch_in_is_rejected() {
        let app = setup_app();
        let (status, punch) = app
            .post("/api/punches/punch-in", json!({ "mechanic_name": "Alice" }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(punch["status"], "active");

        let (status, body) = app
            .post("/api/punches/punch-in", json!({ "mechanic_name": "Alice" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ALREADY_ACTIVE");

        let (_, page) = app.get("/api/punches").await;
        assert_eq!(page["total"], 1);
    }

    #[tokio::test]
    async fn active_punch_lookup_and_punch_out() {
        let app = setup_app();
        let (_, punch) = app
            .post("/api/punches/punch-in", json!({ "mechanic_name": "Alice" }))
            .await;

        let (_, body) = app.get("/api/punches/active/Alice").await;
        assert_eq!(body["active"], true);
        assert_eq!(body["punch"]["id"], punch["id"]);

        let uri = format!("/api/punches/punch-out/{}", punch["id"]);
        let (status, closed) = app.put(&uri, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(closed["status"], "completed");

        let (_, body) = app.get("/api/punches/active/Alice").await;
        assert_eq!(body["active"], false);
        assert!(body["punch"].is_null());
    }

    #[tokio::test]
    async fn session_flow_through_api() {
        let app = setup_app();
        let car_id = app.create_car().await;
        let (_, punch) = app
            .post("/api/punches/punch-in", json!({ "mechanic_name": "Alice" }))
            .await;

        let (status, session) = app
            .post(
                "/api/punches/car-sessions/start",
                json!({ "punch_id": punch["id"], "car_id": car_id, "mechanic_name": "Alice" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = app
            .post(
                "/api/punches/car-sessions/start",
                json!({ "punch_id": punch["id"], "car_id": car_id, "mechanic_name": "Alice" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/api/punches/car-sessions/end/{}", session["id"]);
        let (status, ended) = app.put(&uri, json!({ "total_hours": 1.5 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ended["total_hours"], 1.5);

        let (_, costs) = app.get("/api/punches/summary/car-costs").await;
        assert_eq!(costs[0]["car_id"], car_id);
        assert_eq!(costs[0]["total_hours"], 1.5);
    }

    #[tokio::test]
    async fn reset_hours_for_unknown_mechanic_is_not_found() {
        let app = setup_app();
        let (status, _) = app
            .post("/api/punches/reset-hours/Nobody", json!({}))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

mod validation_tests {
    use super::*;

    #[tokio::test]
    async fn unknown_status_is_bad_request_with_field() {
        let app = setup_app();
        let car_id = app.create_car().await;
        let (_, task) = app
            .post("/api/tasks", json!({ "car_id": car_id, "title": "Mirrors" }))
            .await;
        let uri = format!("/api/tasks/{}", task["id"]);

        let (status, body) = app.put(&uri, json!({ "status": "done" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_FIELD_VALUE");
        assert_eq!(body["field"], "status");

        let (_, stored) = app.get(&uri).await;
        assert_eq!(stored["status"], "pending");
    }

    #[tokio::test]
    async fn non_integer_car_id_is_bad_request() {
        let app = setup_app();
        let (status, body) = app
            .post("/api/tasks", json!({ "car_id": "abc", "title": "Hood" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_FIELD_VALUE");
        assert_eq!(body["field"], "car_id");
    }

    #[tokio::test]
    async fn priority_accepts_integer_flags() {
        let app = setup_app();
        let car_id = app.create_car().await;
        let (status, task) = app
            .post(
                "/api/tasks",
                json!({ "car_id": car_id, "title": "Airbag", "is_priority": 1 }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(task["is_priority"], true);

        let (status, task) = app
            .put(&format!("/api/tasks/{}", task["id"]), json!({ "is_priority": 0 }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(task["is_priority"], false);
    }

    #[tokio::test]
    async fn non_rfc3339_punch_in_is_bad_request() {
        let app = setup_app();
        let (_, punch) = app
            .post("/api/punches/punch-in", json!({ "mechanic_name": "Alice" }))
            .await;

        let (status, body) = app
            .put(
                &format!("/api/punches/{}/edit", punch["id"]),
                json!({ "punch_in": "yesterday", "password": ADMIN_PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_FIELD_VALUE");
        assert_eq!(body["field"], "punch_in");
    }

    #[tokio::test]
    async fn broken_json_is_bad_request() {
        let app = setup_app();
        let (status, body) = app
            .send_text(Method::POST, "/api/mechanics", r#"{"name": "#)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MALFORMED_BODY");
    }

    #[tokio::test]
    async fn missing_content_type_is_bad_request() {
        let app = setup_app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/mechanics")
            .body(Body::from(json!({ "name": "Alice" }).to_string()))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn end_session_without_body_derives_hours() {
        let app = setup_app();
        let car_id = app.create_car().await;
        let (_, punch) = app
            .post("/api/punches/punch-in", json!({ "mechanic_name": "Alice" }))
            .await;
        let (_, session) = app
            .post(
                "/api/punches/car-sessions/start",
                json!({ "punch_id": punch["id"], "car_id": car_id, "mechanic_name": "Alice" }),
            )
            .await;

        let (status, ended) = app
            .send(
                Method::PUT,
                &format!("/api/punches/car-sessions/end/{}", session["id"]),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(ended["end_time"].is_string());
        assert!(ended["total_hours"].is_number());
    }
}

mod admin_tests {
    use super::*;

    #[tokio::test]
    async fn delete_all_requires_password() {
        let app = setup_app();
        app.post("/api/punches/punch-in", json!({ "mechanic_name": "Alice" }))
            .await;

        let (status, body) = app
            .send(
                Method::DELETE,
                "/api/punches/delete-all",
                Some(json!({ "password": "wrong" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
        assert_eq!(app.db.list_punches(&Default::default()).unwrap().total, 1);

        let (status, body) = app
            .send(
                Method::DELETE,
                "/api/punches/delete-all",
                Some(json!({ "password": ADMIN_PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted_punches"], 1);
        assert_eq!(app.db.list_punches(&Default::default()).unwrap().total, 0);
    }

    #[tokio::test]
    async fn edit_punch_requires_password() {
        let app = setup_app();
        let (_, punch) = app
            .post("/api/punches/punch-in", json!({ "mechanic_name": "Alice" }))
            .await;
        let uri = format!("/api/punches/{}/edit", punch["id"]);

        let (status, _) = app
            .put(
                &uri,
                json!({
                    "punch_in": "2026-01-05T08:00:00Z",
                    "punch_out": "2026-01-05T16:00:00Z",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let stored = app.db.get_punch(punch["id"].as_i64().unwrap()).unwrap().unwrap();
        assert!(stored.punch_out.is_none());

        let (status, edited) = app
            .put(
                &uri,
                json!({
                    "punch_in": "2026-01-05T08:00:00Z",
                    "punch_out": "2026-01-05T16:00:00Z",
                    "password": ADMIN_PASSWORD,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(edited["total_hours"], 8.0);
        assert_eq!(edited["status"], "completed");
    }

    #[tokio::test]
    async fn no_configured_password_refuses_everything() {
        let db = Database::open_in_memory().unwrap();
        let state = AppState::new(
            db,
            Arc::new(Broadcaster::new(4)),
            AdminConfig { password: None },
        );
        let router = build_router(Arc::new(state));

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/api/punches/delete-all")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "password": "" }).to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

mod realtime_tests {
    use super::*;

    #[tokio::test]
    async fn task_creation_is_broadcast() {
        let app = setup_app();
        let car_id = app.create_car().await;
        let mut rx = app.broadcaster.subscribe().unwrap();

        let (_, task) = app
            .post("/api/tasks", json!({ "car_id": car_id, "title": "Radiator" }))
            .await;

        let message: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(message["event"], "task-added");
        assert_eq!(message["data"]["id"], task["id"]);
    }

    #[tokio::test]
    async fn completion_broadcasts_mechanic_then_task() {
        let app = setup_app();
        let car_id = app.create_car().await;
        app.create_mechanic("Alice").await;
        let (_, task) = app
            .post(
                "/api/tasks",
                json!({
                    "car_id": car_id,
                    "title": "Fuel pump",
                    "points": 2,
                    "assigned_mechanic": "Alice"
                }),
            )
            .await;

        let mut rx = app.broadcaster.subscribe().unwrap();
        app.put(
            &format!("/api/tasks/{}", task["id"]),
            json!({ "status": "completed" }),
        )
        .await;

        let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["event"], "mechanic-updated");
        assert_eq!(first["data"]["total_points"], 2.0);
        let second: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["event"], "task-updated");
    }

    #[tokio::test]
    async fn refused_admin_action_publishes_nothing() {
        let app = setup_app();
        let mut rx = app.broadcaster.subscribe().unwrap();

        app.send(
            Method::DELETE,
            "/api/punches/delete-all",
            Some(json!({ "password": "nope" })),
        )
        .await;
        assert!(rx.try_recv().is_err());
    }
}
