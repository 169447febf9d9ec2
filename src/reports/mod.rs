//! Report shapes and the reductions that produce them.
//!
//! Everything here is pure: rows in, summaries out. Dates are `YYYY-MM-DD`
//! strings and are ordered lexicographically, which matches calendar order
//! because the format is fixed-width and zero-padded.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::db::Row;

/// Days covered by the default trailing window
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Inclusive date range, bounds kept as the strings sent to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: String,
    pub to: String,
}

impl DateRange {
    /// `[today - days, today]`
    pub fn trailing(today: NaiveDate, days: i64) -> Self {
        Self {
            from: format_date(today - Duration::days(days)),
            to: format_date(today),
        }
    }

    /// Caller-supplied bounds are used verbatim; each missing or empty bound
    /// falls back to the default trailing window independently.
    pub fn resolve(from: Option<String>, to: Option<String>, today: NaiveDate) -> Self {
        let default = Self::trailing(today, DEFAULT_WINDOW_DAYS);
        Self {
            from: non_empty(from).unwrap_or(default.from),
            to: non_empty(to).unwrap_or(default.to),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Visits value as an integer: numbers as-is, numeric strings parsed,
/// anything else 0.
///
/// Fractions are truncated per row before any summing, so two rows of `"2.5"`
/// add up to 4. Values beyond the `i64` range saturate.
pub fn coerce_visits(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn row_date(row: &Row) -> Option<&str> {
    row.get("date").and_then(Value::as_str)
}

fn row_visits(row: &Row) -> i64 {
    row.get("visits").map(coerce_visits).unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyOrders {
    pub date: String,
    pub orders: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyVisits {
    pub date: String,
    pub visits: i64,
}

/// One entry per date with the number of sale rows on that date, ascending.
/// Rows without a string `date` are skipped.
pub fn daily_sales(rows: &[Row]) -> Vec<DailyOrders> {
    let mut by_date: BTreeMap<&str, u64> = BTreeMap::new();
    for date in rows.iter().filter_map(row_date) {
        *by_date.entry(date).or_default() += 1;
    }

    by_date
        .into_iter()
        .map(|(date, orders)| DailyOrders {
            date: date.to_string(),
            orders,
        })
        .collect()
}

/// One entry per date with the summed visits on that date, ascending.
pub fn daily_visits(rows: &[Row]) -> Vec<DailyVisits> {
    let mut by_date: BTreeMap<&str, i64> = BTreeMap::new();
    for row in rows {
        if let Some(date) = row_date(row) {
            let total = by_date.entry(date).or_default();
            *total = total.saturating_add(row_visits(row));
        }
    }

    by_date
        .into_iter()
        .map(|(date, visits)| DailyVisits {
            date: date.to_string(),
            visits,
        })
        .collect()
}

pub fn total_visits(rows: &[Row]) -> i64 {
    rows.iter()
        .map(row_visits)
        .fold(0i64, |acc, visits| acc.saturating_add(visits))
}

/// `sales / visits` rounded to 4 decimal places, 0 when there were no visits
pub fn conversion_rate(sales: u64, visits: i64) -> f64 {
    if visits <= 0 {
        return 0.0;
    }
    let ratio = sales as f64 / visits as f64;
    (ratio * 10_000.0).round() / 10_000.0
}

/// `GET /kpis`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub range: DateRange,
    pub sales_30d: u64,
    pub visits_30d: i64,
    pub conv_30d: f64,
}

/// `GET /sales/daily`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySalesReport {
    pub from: String,
    pub to: String,
    pub rows: Vec<DailyOrders>,
}

/// `GET /visits/daily`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyVisitsReport {
    pub from: String,
    pub to: String,
    pub rows: Vec<DailyVisits>,
}

/// `GET /stock/full`, rows passed through untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub date: String,
    pub count: usize,
    pub rows: Vec<Row>,
}

/// `GET /ping-supa`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeReport {
    pub fn reachable(table: &str) -> Self {
        Self {
            ok: true,
            table: Some(table.to_string()),
            error: None,
        }
    }

    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            table: None,
            error: Some(error.into()),
        }
    }
}
