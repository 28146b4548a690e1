//! Entry point for the reporting service: turns a snapshot of stored user
//! rows into bucketed gender statistics.
//!
//! Rows are resolved one by one. A row whose date cannot be resolved is
//! skipped and counted, never failing the whole computation.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::aggregate::{self, BucketPolicy, ClassifiedRecord, GenderPolicy};
use crate::bounds;
use crate::calendar::{CalendarError, JalaaliDate};
use crate::models::{AllStats, GenderBucketStat, StatRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationDiagnostics {
    /// Rows left out because their date could not be resolved.
    pub skipped_records: usize,
    /// Rows whose gender matched neither configured token.
    pub unrecognized_genders: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsOutcome<T> {
    pub stats: T,
    pub diagnostics: AggregationDiagnostics,
}

#[derive(Debug, Clone)]
pub struct StatsEngine {
    policy: GenderPolicy,
    offset: FixedOffset,
}

impl StatsEngine {
    pub fn new(policy: GenderPolicy, offset: FixedOffset) -> Self {
        Self { policy, offset }
    }

    /// Calendar day of `instant` at the configured offset.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    pub fn classify(&self, records: &[StatRecord]) -> (Vec<ClassifiedRecord>, AggregationDiagnostics) {
        let mut diagnostics = AggregationDiagnostics::default();
        let mut classified = Vec::with_capacity(records.len());

        for record in records {
            let date = match self.resolve_date(record) {
                Ok(date) => date,
                Err(err) => {
                    warn!(
                        persian_date = ?record.persian_date,
                        error = %err,
                        "skipping record with unusable date"
                    );
                    diagnostics.skipped_records += 1;
                    continue;
                }
            };

            let (gender, recognized) = self.policy.classify(&record.gender);
            if !recognized {
                debug!(gender = %record.gender, "gender value counted as {gender}");
                diagnostics.unrecognized_genders += 1;
            }
            classified.push(ClassifiedRecord { date, gender });
        }

        if diagnostics.unrecognized_genders > 0 {
            warn!(
                count = diagnostics.unrecognized_genders,
                "records with unrecognized gender were counted as {}",
                self.policy.female_token
            );
        }

        (classified, diagnostics)
    }

    /// The stored Jalaali string wins; `created_at` is only used when it is
    /// missing or blank.
    fn resolve_date(&self, record: &StatRecord) -> Result<JalaaliDate, CalendarError> {
        match record.persian_date.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => JalaaliDate::parse(raw),
            _ => match record.created_at {
                Some(created_at) => JalaaliDate::from_gregorian(self.local_date(created_at)),
                None => Err(CalendarError::InvalidDate(
                    "record has neither a jalaali date nor a creation time".to_string(),
                )),
            },
        }
    }

    pub fn all_stats(&self, records: &[StatRecord]) -> StatsOutcome<AllStats> {
        let (classified, diagnostics) = self.classify(records);

        let stats = AllStats {
            total: aggregate::aggregate_range(&classified, "all", None, None),
            daily: BucketPolicy::Daily.aggregate(&classified),
            weekly: BucketPolicy::WeeklyByDayOfMonth.aggregate(&classified),
            monthly: BucketPolicy::Monthly.aggregate(&classified),
        };

        StatsOutcome { stats, diagnostics }
    }

    pub fn weekly_by_day_of_month(&self, records: &[StatRecord]) -> StatsOutcome<Vec<GenderBucketStat>> {
        let (classified, diagnostics) = self.classify(records);
        StatsOutcome {
            stats: BucketPolicy::WeeklyByDayOfMonth.aggregate(&classified),
            diagnostics,
        }
    }

    pub fn monthly(&self, records: &[StatRecord]) -> StatsOutcome<Vec<GenderBucketStat>> {
        let (classified, diagnostics) = self.classify(records);
        StatsOutcome {
            stats: BucketPolicy::Monthly.aggregate(&classified),
            diagnostics,
        }
    }

    /// Saturday-based week containing `now`, labelled `start - end`.
    pub fn current_week(
        &self,
        records: &[StatRecord],
        now: DateTime<Utc>,
    ) -> Result<StatsOutcome<GenderBucketStat>, CalendarError> {
        let week = bounds::current_week_bounds(self.local_date(now))?;
        let (classified, diagnostics) = self.classify(records);
        let label = format!("{} - {}", week.start, week.end);

        Ok(StatsOutcome {
            stats: aggregate::aggregate_range(&classified, &label, Some(week.start), Some(week.end)),
            diagnostics,
        })
    }

    /// Jalaali month containing `now`, labelled `YYYY/MM`.
    pub fn current_month(
        &self,
        records: &[StatRecord],
        now: DateTime<Utc>,
    ) -> Result<StatsOutcome<GenderBucketStat>, CalendarError> {
        let month = bounds::current_month_bounds(self.local_date(now))?;
        let (classified, diagnostics) = self.classify(records);
        let label = format!("{:04}/{:02}", month.start.year(), month.start.month());

        Ok(StatsOutcome {
            stats: aggregate::aggregate_range(&classified, &label, Some(month.start), Some(month.end)),
            diagnostics,
        })
    }
}
