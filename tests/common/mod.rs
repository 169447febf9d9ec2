#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use reporting_api::{
    config::AppConfig,
    db::{DbError, QueryResult, ReportStore, Row, SelectQuery},
    AppState,
};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "s3cret";

/// In-memory store answering per table and recording every query it sees.
/// Tables without an answer fail with a backend 404.
#[derive(Default)]
pub struct MemoryStore {
    answers: HashMap<&'static str, QueryResult>,
    seen: Mutex<Vec<SelectQuery>>,
}

impl MemoryStore {
    pub fn with_rows(mut self, table: &'static str, rows: Vec<Value>) -> Self {
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|v| v.as_object().cloned().expect("row must be a JSON object"))
            .collect();
        self.answers.insert(table, QueryResult::from_rows(rows));
        self
    }

    pub fn with_count(mut self, table: &'static str, count: u64) -> Self {
        self.answers.insert(table, QueryResult::from_count(count));
        self
    }

    pub fn seen(&self) -> Vec<SelectQuery> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn select(&self, query: &SelectQuery) -> Result<QueryResult, DbError> {
        self.seen.lock().unwrap().push(query.clone());
        self.answers
            .get(query.table)
            .cloned()
            .ok_or_else(|| DbError::Status {
                status: 404,
                message: format!("relation \"{}\" does not exist", query.table),
            })
    }
}

/// Helper harness wiring the full router over a [`MemoryStore`].
pub struct TestApp {
    router: Router,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new(store: MemoryStore) -> Self {
        let cfg = AppConfig::new(
            TEST_SECRET.to_string(),
            "https://db.example.com".to_string(),
            "service-key".to_string(),
        );
        let store = Arc::new(store);
        let state = AppState::new(cfg, store.clone());

        Self {
            router: reporting_api::app_router(state),
            store,
        }
    }

    /// Send a request with an optional raw `Authorization` header value
    pub async fn request(&self, method: Method, uri: &str, authorization: Option<&str>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let request = builder.body(Body::empty()).expect("request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn get_authenticated(&self, uri: &str) -> Response {
        let bearer = format!("Bearer {}", TEST_SECRET);
        self.request(Method::GET, uri, Some(&bearer)).await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
