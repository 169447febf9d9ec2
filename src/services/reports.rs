use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::{
    db::{DbError, ReportStore, SelectQuery},
    reports::{
        self, DailySalesReport, DailyVisitsReport, DateRange, KpiSummary, StockSnapshot,
        DEFAULT_WINDOW_DAYS,
    },
};

pub const SALES_TABLE: &str = "sales";
pub const VISITS_TABLE: &str = "visits";
pub const STOCK_TABLE: &str = "stock";

/// Tables probed by [`ReportService::probe`], in order
pub const PROBE_TABLES: [&str; 3] = [SALES_TABLE, VISITS_TABLE, STOCK_TABLE];

pub const VISITS_ROW_LIMIT: usize = 100_000;
pub const STOCK_ROW_LIMIT: usize = 10_000;

/// Service for the read-only reports served over HTTP
#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn ReportStore>,
}

impl ReportService {
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        Self { store }
    }

    /// Sales count, visit total and conversion over the fixed 30-day window ending `today`
    #[instrument(skip(self))]
    pub async fn kpis(&self, today: NaiveDate) -> Result<KpiSummary, DbError> {
        let range = DateRange::trailing(today, DEFAULT_WINDOW_DAYS);

        let sales = self
            .store
            .select(
                &SelectQuery::table(SALES_TABLE)
                    .gte("date", &range.from)
                    .lte("date", &range.to)
                    .count_only(),
            )
            .await?;
        let sales_30d = sales
            .count
            .ok_or_else(|| DbError::InvalidCount("count-only query returned no count".into()))?;

        let visits = self.visit_rows(&range).await?;
        let visits_30d = reports::total_visits(&visits);

        info!(sales = sales_30d, visits = visits_30d, "Computed KPI summary");

        Ok(KpiSummary {
            conv_30d: reports::conversion_rate(sales_30d, visits_30d),
            range,
            sales_30d,
            visits_30d,
        })
    }

    /// Units sold per day in `range`
    #[instrument(skip(self))]
    pub async fn daily_sales(&self, range: DateRange) -> Result<DailySalesReport, DbError> {
        let result = self
            .store
            .select(
                &SelectQuery::table(SALES_TABLE)
                    .columns("date,item_id")
                    .gte("date", &range.from)
                    .lte("date", &range.to),
            )
            .await?;

        debug!(rows = result.rows.len(), "Fetched sales rows");
        let rows = reports::daily_sales(&result.rows);

        Ok(DailySalesReport {
            from: range.from,
            to: range.to,
            rows,
        })
    }

    /// Visits per day in `range`
    #[instrument(skip(self))]
    pub async fn daily_visits(&self, range: DateRange) -> Result<DailyVisitsReport, DbError> {
        let rows = self.visit_rows(&range).await?;
        debug!(rows = rows.len(), "Fetched visit rows");

        Ok(DailyVisitsReport {
            rows: reports::daily_visits(&rows),
            from: range.from,
            to: range.to,
        })
    }

    /// Raw stock rows recorded on `date`
    #[instrument(skip(self))]
    pub async fn stock_snapshot(&self, date: String) -> Result<StockSnapshot, DbError> {
        let result = self
            .store
            .select(
                &SelectQuery::table(STOCK_TABLE)
                    .eq("date", &date)
                    .limit(STOCK_ROW_LIMIT),
            )
            .await?;

        Ok(StockSnapshot {
            date,
            count: result.rows.len(),
            rows: result.rows,
        })
    }

    /// Name of the first table that answers a count probe.
    ///
    /// Candidates are tried in order and earlier failures are only logged;
    /// the last error is returned when none answers.
    #[instrument(skip(self))]
    pub async fn probe(&self) -> Result<&'static str, DbError> {
        let mut last_error = None;

        for table in PROBE_TABLES {
            match self
                .store
                .select(&SelectQuery::table(table).count_only())
                .await
            {
                Ok(_) => return Ok(table),
                Err(err) => {
                    warn!(table, error = %err, "Probe query failed");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DbError::Transport("no probe candidates".into())))
    }

    async fn visit_rows(&self, range: &DateRange) -> Result<Vec<crate::db::Row>, DbError> {
        let result = self
            .store
            .select(
                &SelectQuery::table(VISITS_TABLE)
                    .columns("date,visits")
                    .gte("date", &range.from)
                    .lte("date", &range.to)
                    .limit(VISITS_ROW_LIMIT),
            )
            .await?;
        Ok(result.rows)
    }
}
