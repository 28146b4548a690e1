use std::fmt::Write;

use crate::calendar::JalaaliDate;
use crate::models::{AllStats, GenderBucketStat};
use crate::stats::{AggregationDiagnostics, StatsOutcome};

const MONTH_NAMES: [&str; 12] = [
    "فروردین",
    "اردیبهشت",
    "خرداد",
    "تیر",
    "مرداد",
    "شهریور",
    "مهر",
    "آبان",
    "آذر",
    "دی",
    "بهمن",
    "اسفند",
];

/// `"1403/02"` or `"02"` style keys to `"اردیبهشت 1403"` / `"اردیبهشت"`.
pub fn persian_month_label(key: &str) -> Option<String> {
    let (year, month) = match key.split_once('/') {
        Some((year, month)) => (Some(year), month),
        None => (None, key),
    };
    let index: usize = month.parse().ok()?;
    let name = MONTH_NAMES.get(index.checked_sub(1)?)?;
    Some(match year {
        Some(year) => format!("{name} {year}"),
        None => name.to_string(),
    })
}

fn write_row(output: &mut String, label: &str, stat: &GenderBucketStat) {
    let _ = writeln!(
        output,
        "| {} | {} | {} | {:.2}% | {:.2}% |",
        label, stat.male_count, stat.female_count, stat.male_percentage, stat.female_percentage
    );
}

fn write_table<'a, I>(output: &mut String, title: &str, rows: I)
where
    I: IntoIterator<Item = (String, &'a GenderBucketStat)>,
{
    let _ = writeln!(output);
    let _ = writeln!(output, "## {title}");
    let _ = writeln!(output);
    let _ = writeln!(output, "| Bucket | Male | Female | Male % | Female % |");
    let _ = writeln!(output, "| --- | ---: | ---: | ---: | ---: |");

    let mut empty = true;
    for (label, stat) in rows {
        empty = false;
        write_row(output, &label, stat);
    }
    if empty {
        let _ = writeln!(output, "| no submissions | 0 | 0 | 0.00% | 0.00% |");
    }
}

pub fn build_report(
    generated_on: JalaaliDate,
    outcome: &StatsOutcome<AllStats>,
    week: &GenderBucketStat,
    month: &GenderBucketStat,
) -> String {
    let stats = &outcome.stats;
    let mut output = String::new();

    let _ = writeln!(output, "# Gender Distribution Report");
    let _ = writeln!(output, "Generated on {generated_on}");
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "- Total: {} submissions ({} male, {} female; {:.2}% / {:.2}%)",
        stats.total.total(),
        stats.total.male_count,
        stats.total.female_count,
        stats.total.male_percentage,
        stats.total.female_percentage
    );
    let _ = writeln!(
        output,
        "- Current week ({}): {} male, {} female",
        week.bucket, week.male_count, week.female_count
    );
    let month_label = persian_month_label(&month.bucket).unwrap_or_else(|| month.bucket.clone());
    let _ = writeln!(
        output,
        "- Current month ({}): {} male, {} female",
        month_label, month.male_count, month.female_count
    );
    write_diagnostics(&mut output, &outcome.diagnostics);

    write_table(
        &mut output,
        "Daily",
        stats.daily.iter().map(|stat| (stat.bucket.clone(), stat)),
    );
    write_table(
        &mut output,
        "Weekly (by day of month)",
        stats.weekly.iter().map(|stat| (stat.bucket.clone(), stat)),
    );
    write_table(
        &mut output,
        "Monthly",
        stats.monthly.iter().map(|stat| {
            let label = persian_month_label(&stat.bucket).unwrap_or_else(|| stat.bucket.clone());
            (label, stat)
        }),
    );

    output
}

fn write_diagnostics(output: &mut String, diagnostics: &AggregationDiagnostics) {
    if diagnostics.skipped_records > 0 {
        let _ = writeln!(
            output,
            "- Skipped {} submissions with unreadable dates",
            diagnostics.skipped_records
        );
    }
    if diagnostics.unrecognized_genders > 0 {
        let _ = writeln!(
            output,
            "- {} submissions had an unrecognized gender and were counted as female",
            diagnostics.unrecognized_genders
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::GenderPolicy;
    use crate::config::default_offset;
    use crate::models::StatRecord;
    use crate::stats::StatsEngine;
    use chrono::{TimeZone, Utc};

    fn row(date: &str, gender: &str) -> StatRecord {
        StatRecord {
            persian_date: Some(date.to_string()),
            created_at: None,
            gender: gender.to_string(),
        }
    }

    #[test]
    fn month_labels_use_persian_names() {
        assert_eq!(persian_month_label("01").as_deref(), Some("فروردین"));
        assert_eq!(persian_month_label("1403/12").as_deref(), Some("اسفند 1403"));
        assert_eq!(persian_month_label("13"), None);
        assert_eq!(persian_month_label("00"), None);
        assert_eq!(persian_month_label("Week 1"), None);
    }

    #[test]
    fn report_includes_every_section() {
        let engine = StatsEngine::new(GenderPolicy::default(), default_offset());
        let records = vec![
            row("1403/01/15", "Male"),
            row("1403/01/15", "Femail"),
            row("1403/01/16", "Male"),
            row("bogus", "Male"),
        ];
        let now = Utc.with_ymd_and_hms(2024, 4, 2, 8, 0, 0).unwrap();
        let outcome = engine.all_stats(&records);
        let week = engine.current_week(&records, now).unwrap().stats;
        let month = engine.current_month(&records, now).unwrap().stats;
        let today = JalaaliDate::from_gregorian(engine.local_date(now)).unwrap();

        let report = build_report(today, &outcome, &week, &month);

        assert!(report.contains("Generated on 1403/01/14"));
        assert!(report.contains("- Total: 3 submissions (2 male, 1 female; 66.67% / 33.33%)"));
        assert!(report.contains("- Current week (1403/01/11 - 1403/01/17): 2 male, 1 female"));
        assert!(report.contains("- Current month (فروردین 1403): 2 male, 1 female"));
        assert!(report.contains("Skipped 1 submissions"));
        assert!(report.contains("1 submissions had an unrecognized gender"));
        assert!(report.contains("| 1403/01/16 | 1 | 0 | 100.00% | 0.00% |"));
        assert!(report.contains("| Week 3 | 2 | 1 | 66.67% | 33.33% |"));
        assert!(report.contains("| اسفند | 0 | 0 | 0.00% | 0.00% |"));
    }

    #[test]
    fn empty_tables_have_placeholder_rows() {
        let engine = StatsEngine::new(GenderPolicy::default(), default_offset());
        let outcome = engine.all_stats(&[]);
        let empty = GenderBucketStat::new("1403/01", 0, 0);
        let today = JalaaliDate::new(1403, 1, 1).unwrap();

        let report = build_report(today, &outcome, &empty, &empty);
        assert_eq!(report.matches("| no submissions |").count(), 2);
        assert!(!report.contains("Skipped"));
    }
}
