use std::collections::BTreeMap;

use crate::calendar::JalaaliDate;
use crate::models::{Gender, GenderBucketStat};

/// A record whose date and gender are already resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedRecord {
    pub date: JalaaliDate,
    pub gender: Gender,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenderPolicy {
    pub male_token: String,
    pub female_token: String,
}

impl Default for GenderPolicy {
    fn default() -> Self {
        Self {
            male_token: Gender::Male.as_str().to_string(),
            female_token: Gender::Female.as_str().to_string(),
        }
    }
}

impl GenderPolicy {
    /// Exact male token is Male, anything else is Female. The canonical
    /// values written at intake always classify as themselves, whatever the
    /// configured tokens. The flag reports whether the value was recognized.
    pub fn classify(&self, raw: &str) -> (Gender, bool) {
        if raw == self.male_token || raw == Gender::Male.as_str() {
            (Gender::Male, true)
        } else {
            let recognized = raw == self.female_token || raw == Gender::Female.as_str();
            (Gender::Female, recognized)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketPolicy {
    Daily,
    /// Day-of-month split into 7-day chunks ("Week 1".."Week 5"), not
    /// Saturday-based calendar weeks.
    WeeklyByDayOfMonth,
    Monthly,
}

impl BucketPolicy {
    pub fn aggregate(&self, records: &[ClassifiedRecord]) -> Vec<GenderBucketStat> {
        match self {
            BucketPolicy::Daily => aggregate_by_exact_bucket(records, daily_key),
            BucketPolicy::WeeklyByDayOfMonth => {
                aggregate_by_exact_bucket(records, day_of_month_week_key)
            }
            BucketPolicy::Monthly => aggregate_monthly(records),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    male: u64,
    female: u64,
}

impl Tally {
    fn add(&mut self, gender: Gender) {
        match gender {
            Gender::Male => self.male += 1,
            Gender::Female => self.female += 1,
        }
    }
}

pub fn daily_key(date: &JalaaliDate) -> String {
    date.to_string()
}

pub fn day_of_month_week_key(date: &JalaaliDate) -> String {
    format!("Week {}", (date.day() - 1) / 7 + 1)
}

pub fn month_key(date: &JalaaliDate) -> String {
    format!("{:02}", date.month())
}

/// Groups records by `key_fn`, sorted by key in string order.
pub fn aggregate_by_exact_bucket<F>(records: &[ClassifiedRecord], key_fn: F) -> Vec<GenderBucketStat>
where
    F: Fn(&JalaaliDate) -> String,
{
    let mut buckets: BTreeMap<String, Tally> = BTreeMap::new();
    for record in records {
        buckets.entry(key_fn(&record.date)).or_default().add(record.gender);
    }

    buckets
        .into_iter()
        .map(|(key, tally)| GenderBucketStat::new(key, tally.male, tally.female))
        .collect()
}

/// All twelve months of the latest Jalaali year present, zero-filled.
pub fn aggregate_monthly(records: &[ClassifiedRecord]) -> Vec<GenderBucketStat> {
    let latest_year = records.iter().map(|record| record.date.year()).max();
    let latest: Vec<ClassifiedRecord> = records
        .iter()
        .filter(|record| Some(record.date.year()) == latest_year)
        .copied()
        .collect();

    let mut found: BTreeMap<String, GenderBucketStat> = aggregate_by_exact_bucket(&latest, month_key)
        .into_iter()
        .map(|stat| (stat.bucket.clone(), stat))
        .collect();

    (1..=12)
        .map(|month| {
            let key = format!("{month:02}");
            found
                .remove(&key)
                .unwrap_or_else(|| GenderBucketStat::new(key, 0, 0))
        })
        .collect()
}

/// Single bucket over an inclusive range; `None` leaves that side open.
pub fn aggregate_range(
    records: &[ClassifiedRecord],
    label: &str,
    start: Option<JalaaliDate>,
    end: Option<JalaaliDate>,
) -> GenderBucketStat {
    let mut tally = Tally::default();
    for record in records {
        let after_start = start.map_or(true, |start| record.date >= start);
        let before_end = end.map_or(true, |end| record.date <= end);
        if after_start && before_end {
            tally.add(record.gender);
        }
    }
    GenderBucketStat::new(label, tally.male, tally.female)
}
