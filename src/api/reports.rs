use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ApiResult;
use crate::db::UserStore;
use crate::models::{AllStats, GenderBucketStat, StatRecord};
use crate::stats::{AggregationDiagnostics, StatsEngine};

#[derive(Clone)]
pub struct ReportState {
    store: Arc<dyn UserStore>,
    engine: Arc<StatsEngine>,
    clock: fn() -> DateTime<Utc>,
}

impl ReportState {
    pub fn new(store: Arc<dyn UserStore>, engine: StatsEngine) -> Self {
        Self {
            store,
            engine: Arc::new(engine),
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    async fn snapshot(&self) -> anyhow::Result<Vec<StatRecord>> {
        self.store.stat_records().await
    }
}

pub fn router(state: ReportState) -> Router {
    Router::new()
        .route("/api/report", get(all_stats))
        .route("/api/generate-report", get(generate_report))
        .route("/api/report/current-week", get(current_week))
        .route("/api/report/current-month", get(current_month))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Both keys are always present so clients can read them unconditionally.
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    #[serde(rename = "WeeklyStats")]
    pub weekly_stats: Vec<GenderBucketStat>,
    #[serde(rename = "MonthlyStats")]
    pub monthly_stats: Vec<GenderBucketStat>,
}

fn log_diagnostics(report: &str, records: usize, diagnostics: &AggregationDiagnostics) {
    info!(
        report,
        records,
        skipped = diagnostics.skipped_records,
        unrecognized_genders = diagnostics.unrecognized_genders,
        "report generated"
    );
}

async fn all_stats(State(state): State<ReportState>) -> ApiResult<Json<AllStats>> {
    let records = state.snapshot().await?;
    let outcome = state.engine.all_stats(&records);
    log_diagnostics("all", records.len(), &outcome.diagnostics);
    Ok(Json(outcome.stats))
}

async fn generate_report(
    State(state): State<ReportState>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<ReportResponse>> {
    let records = state.snapshot().await?;
    let kind = query.kind.as_deref().unwrap_or_default();

    let mut response = ReportResponse {
        weekly_stats: Vec::new(),
        monthly_stats: Vec::new(),
    };
    if kind != "month" {
        let outcome = state.engine.weekly_by_day_of_month(&records);
        log_diagnostics("weekly", records.len(), &outcome.diagnostics);
        response.weekly_stats = outcome.stats;
    }
    if kind != "week" {
        let outcome = state.engine.monthly(&records);
        log_diagnostics("monthly", records.len(), &outcome.diagnostics);
        response.monthly_stats = outcome.stats;
    }

    Ok(Json(response))
}

async fn current_week(State(state): State<ReportState>) -> ApiResult<Json<GenderBucketStat>> {
    let records = state.snapshot().await?;
    let outcome = state.engine.current_week(&records, (state.clock)())?;
    log_diagnostics("current-week", records.len(), &outcome.diagnostics);
    Ok(Json(outcome.stats))
}

async fn current_month(State(state): State<ReportState>) -> ApiResult<Json<GenderBucketStat>> {
    let records = state.snapshot().await?;
    let outcome = state.engine.current_month(&records, (state.clock)())?;
    log_diagnostics("current-month", records.len(), &outcome.diagnostics);
    Ok(Json(outcome.stats))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::TimeZone;
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::aggregate::GenderPolicy;
    use crate::config::default_offset;
    use crate::db::memory::MemoryUserStore;
    use crate::models::UserRecord;

    fn user(persian_date: &str, gender: &str, deleted: bool) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            phone_number: None,
            gender: gender.to_string(),
            persian_date: Some(persian_date.to_string()),
            created_at: Utc::now(),
            deleted_at: deleted.then(Utc::now),
            addresses: Vec::new(),
        }
    }

    fn tuesday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 2, 8, 0, 0).unwrap()
    }

    fn app() -> Router {
        let store = Arc::new(MemoryUserStore::with_users(vec![
            user("1403/01/15", "Male", false),
            user("1403/01/15", "Female", false),
            user("1403/01/16", "Male", false),
            user("1403/01/16", "Female", true),
            user("1403/99/99", "Female", false),
        ]));
        let engine = StatsEngine::new(GenderPolicy::default(), default_offset());
        router(ReportState::new(store, engine).with_clock(tuesday))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn all_stats_excludes_deleted_and_malformed_rows() {
        let (status, json) = get_json(app(), "/api/report").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"]["bucket"], "all");
        assert_eq!(json["total"]["male_count"], 2);
        assert_eq!(json["total"]["female_count"], 1);
        assert_eq!(json["daily"].as_array().unwrap().len(), 2);
        assert_eq!(json["daily"][1]["male_percentage"], 100.0);
        assert_eq!(json["monthly"].as_array().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn generate_report_honours_type() {
        let (_, both) = get_json(app(), "/api/generate-report").await;
        assert_eq!(both["WeeklyStats"][0]["bucket"], "Week 3");
        assert_eq!(both["MonthlyStats"].as_array().unwrap().len(), 12);

        let (_, week) = get_json(app(), "/api/generate-report?type=week").await;
        assert_eq!(week["WeeklyStats"].as_array().unwrap().len(), 1);
        assert!(week["MonthlyStats"].as_array().unwrap().is_empty());

        let (_, month) = get_json(app(), "/api/generate-report?type=month").await;
        assert!(month["WeeklyStats"].as_array().unwrap().is_empty());
        assert_eq!(month["MonthlyStats"][0]["male_count"], 2);
    }

    #[tokio::test]
    async fn current_ranges_use_injected_clock() {
        let (status, week) = get_json(app(), "/api/report/current-week").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(week["bucket"], "1403/01/11 - 1403/01/17");
        assert_eq!(week["male_count"], 2);
        assert_eq!(week["female_count"], 1);

        let (_, month) = get_json(app(), "/api/report/current-month").await;
        assert_eq!(month["bucket"], "1403/01");
        assert_eq!(month["female_percentage"], 33.33);
    }
}
