//! Read-only client for the remote reporting store.
//!
//! The store speaks the PostgREST dialect: one table per path segment, filters
//! as `column=op.value` query parameters and exact counts through
//! `Prefer: count=exact` plus the `Content-Range` response header.

use crate::config::AppConfig;
use async_trait::async_trait;
use reqwest::{header, Method, StatusCode};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

/// A single row as returned by the store
pub type Row = Map<String, Value>;

/// Errors raised while talking to the store
#[derive(Debug, Error)]
pub enum DbError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to decode backend response: {0}")]
    Decode(String),

    #[error("backend did not report a usable count: {0}")]
    InvalidCount(String),

    #[error("invalid backend url: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for DbError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DbError::Decode(err.to_string())
        } else {
            DbError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Gte,
    Lte,
    Eq,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Gte => "gte",
            FilterOp::Lte => "lte",
            FilterOp::Eq => "eq",
        }
    }
}

/// Column filter; only the value is runtime data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: &'static str,
    pub op: FilterOp,
    pub value: String,
}

/// A filtered SELECT against one table.
///
/// Table and column identifiers are `&'static str` so they can only be
/// literals compiled into this crate, never request input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: &'static str,
    pub columns: &'static str,
    pub filters: Vec<Filter>,
    pub limit: Option<usize>,
    pub count_only: bool,
}

impl SelectQuery {
    pub fn table(table: &'static str) -> Self {
        Self {
            table,
            columns: "*",
            filters: Vec::new(),
            limit: None,
            count_only: false,
        }
    }

    pub fn columns(mut self, columns: &'static str) -> Self {
        self.columns = columns;
        self
    }

    pub fn gte(self, column: &'static str, value: impl Into<String>) -> Self {
        self.filter(column, FilterOp::Gte, value)
    }

    pub fn lte(self, column: &'static str, value: impl Into<String>) -> Self {
        self.filter(column, FilterOp::Lte, value)
    }

    pub fn eq(self, column: &'static str, value: impl Into<String>) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Ask only for the number of matching rows
    pub fn count_only(mut self) -> Self {
        self.count_only = true;
        self
    }

    fn filter(mut self, column: &'static str, op: FilterOp, value: impl Into<String>) -> Self {
        self.filters.push(Filter {
            column,
            op,
            value: value.into(),
        });
        self
    }
}

/// Rows (empty for count-only queries) and the exact count when one was requested
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub count: Option<u64>,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows, count: None }
    }

    pub fn from_count(count: u64) -> Self {
        Self {
            rows: Vec::new(),
            count: Some(count),
        }
    }
}

/// Read access to the reporting tables
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn select(&self, query: &SelectQuery) -> Result<QueryResult, DbError>;
}

/// HTTP implementation of [`ReportStore`] against a PostgREST endpoint
#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: Url,
    service_key: String,
}

impl fmt::Debug for RestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl RestStore {
    pub fn new(
        base_url: &str,
        service_key: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, DbError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| DbError::InvalidUrl(e.to_string()))?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url,
            service_key: service_key.into(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, DbError> {
        Self::new(
            &cfg.database_url,
            cfg.database_service_key.clone(),
            cfg.database_timeout(),
        )
    }

    /// Full request URL for a query, parameters encoded
    pub fn query_url(&self, query: &SelectQuery) -> Result<Url, DbError> {
        let mut url = Url::parse(&format!(
            "{}/rest/v1/{}",
            self.base_url.as_str().trim_end_matches('/'),
            query.table
        ))
        .map_err(|e| DbError::InvalidUrl(e.to_string()))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", query.columns);
            for filter in &query.filters {
                pairs.append_pair(
                    filter.column,
                    &format!("{}.{}", filter.op.as_str(), filter.value),
                );
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }

        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", self.service_key.as_str())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.service_key))
    }
}

#[async_trait]
impl ReportStore for RestStore {
    #[instrument(skip(self, query), fields(table = query.table, count_only = query.count_only))]
    async fn select(&self, query: &SelectQuery) -> Result<QueryResult, DbError> {
        let url = self.query_url(query)?;
        debug!(url = %url, "Querying backend");

        if query.count_only {
            let response = self
                .request(Method::HEAD, url)
                .header("Prefer", "count=exact")
                .send()
                .await?;
            let response = ensure_success(response).await?;
            let range = response
                .headers()
                .get(header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| DbError::InvalidCount("missing content-range header".into()))?;
            return parse_content_range(range).map(QueryResult::from_count);
        }

        let response = self.request(Method::GET, url).send().await?;
        let response = ensure_success(response).await?;
        let rows: Vec<Row> = response.json().await?;
        Ok(QueryResult::from_rows(rows))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DbError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(DbError::Status {
        status: status.as_u16(),
        message: backend_message(status, &body),
    })
}

/// PostgREST error bodies carry a `message`; fall back to the raw body or the reason phrase.
fn backend_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string())
}

/// Total from a `Content-Range` value such as `0-24/3573` or `*/0`
pub fn parse_content_range(value: &str) -> Result<u64, DbError> {
    value
        .rsplit_once('/')
        .and_then(|(_, total)| total.trim().parse::<u64>().ok())
        .ok_or_else(|| DbError::InvalidCount(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RestStore {
        RestStore::new("https://db.example.com/", "key", None).unwrap()
    }

    #[test]
    fn query_url_encodes_columns_filters_and_limit() {
        let query = SelectQuery::table("visits")
            .columns("date,visits")
            .gte("date", "2024-01-01")
            .lte("date", "2024-01-31")
            .limit(100_000);
        let url = store().query_url(&query).unwrap();

        assert_eq!(url.path(), "/rest/v1/visits");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("select".to_string(), "date,visits".to_string()),
                ("date".to_string(), "gte.2024-01-01".to_string()),
                ("date".to_string(), "lte.2024-01-31".to_string()),
                ("limit".to_string(), "100000".to_string()),
            ]
        );
    }

    #[test]
    fn filter_values_cannot_inject_parameters() {
        let query = SelectQuery::table("stock").eq("date", "2024-01-01&limit=1");
        let url = store().query_url(&query).unwrap();
        let limits = url.query_pairs().filter(|(k, _)| k == "limit").count();
        assert_eq!(limits, 0);
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "date" && v == "eq.2024-01-01&limit=1"));
    }

    #[test]
    fn builder_defaults_to_all_columns_without_limit() {
        let query = SelectQuery::table("sales");
        assert_eq!(query.columns, "*");
        assert!(query.filters.is_empty());
        assert_eq!(query.limit, None);
        assert!(!query.count_only);
        assert!(SelectQuery::table("sales").count_only().count_only);
    }

    #[test]
    fn content_range_total_is_parsed() {
        assert_eq!(parse_content_range("0-24/3573").unwrap(), 3573);
        assert_eq!(parse_content_range("*/0").unwrap(), 0);
        assert!(matches!(
            parse_content_range("0-24/*"),
            Err(DbError::InvalidCount(_))
        ));
        assert!(parse_content_range("garbage").is_err());
    }

    #[test]
    fn backend_message_prefers_json_message() {
        let body = r#"{"code":"42P01","message":"relation \"x\" does not exist"}"#;
        assert_eq!(
            backend_message(StatusCode::NOT_FOUND, body),
            "relation \"x\" does not exist"
        );
        assert_eq!(backend_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
        assert_eq!(backend_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            RestStore::new("not a url", "key", None),
            Err(DbError::InvalidUrl(_))
        ));
    }
}
