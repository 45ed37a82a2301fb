//! Shared fixture for the API tests
#![allow(dead_code)]

use axum::body::Body;
use axum::Router;
use chrono::{Duration, NaiveDate, Utc};
use hyper::{Request, StatusCode};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use timed::config::Config;
use timed::models::{Project, Report, Task, User};
use timed::notify::MemoryOutbox;
use timed::store::Store;
use timed::{api, AppState};

pub struct TestApp {
    pub app: Router,
    pub state: Arc<AppState>,
    pub outbox: MemoryOutbox,
    pub project: Project,
    pub task: Task,
}

impl TestApp {
    pub fn store(&self) -> &Store {
        self.state.store()
    }

    pub async fn user(&self, name: &str) -> User {
        self.store()
            .create_user(name, &format!("{}@example.com", name), false)
            .await
            .unwrap()
    }

    pub async fn superuser(&self, name: &str) -> User {
        self.store()
            .create_user(name, &format!("{}@example.com", name), true)
            .await
            .unwrap()
    }

    /// Insert a one hour report on 2017-02-01 for `owner`
    pub async fn report(&self, owner: &User) -> Report {
        self.report_on(owner, self.task.id).await
    }

    pub async fn report_on(&self, owner: &User, task_id: Uuid) -> Report {
        let now = Utc::now();
        let report = Report {
            id: Uuid::new_v4(),
            user_id: owner.id,
            task_id,
            date: NaiveDate::from_ymd_opt(2017, 2, 1).unwrap(),
            duration: Duration::hours(1),
            comment: String::new(),
            not_billable: false,
            review: false,
            verified_by: None,
            created_at: now,
            updated_at: now,
        };
        self.store().insert_report(&report).await.unwrap();
        report
    }

    pub async fn save(&self, report: &Report) {
        self.store().save_report(report).await.unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
        };
        (status, value)
    }
}

pub async fn setup() -> TestApp {
    setup_with(Config::default()).await
}

pub async fn setup_with(config: Config) -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let outbox = MemoryOutbox::new();
    let state = AppState::new(pool, &config, Arc::new(outbox.clone()));

    let customer = state.store().create_customer("ACME").await.unwrap();
    let project = state
        .store()
        .create_project("Website", customer.id, None, None)
        .await
        .unwrap();
    let task = state
        .store()
        .create_task("Development", project.id, None)
        .await
        .unwrap();

    TestApp {
        app: api::router(state.clone()),
        state,
        outbox,
        project,
        task,
    }
}

pub fn get(uri: &str, actor: &User) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(api::USER_HEADER, actor.id.to_string())
        .body(Body::empty())
        .unwrap()
}

pub fn delete(uri: &str, actor: &User) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(api::USER_HEADER, actor.id.to_string())
        .body(Body::empty())
        .unwrap()
}

pub fn with_json(method: &str, uri: &str, actor: &User, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(api::USER_HEADER, actor.id.to_string())
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
