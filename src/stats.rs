//! Aggregation adapter: reduces raw collections, or normalizes pre-aggregated
//! gateway payloads, into the fixed shapes the dashboard renders.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use indexmap::IndexMap;
use serde_json::Value;

use crate::filter::StudentDirectory;
use crate::models::{
    AttendanceRecord, AttendanceStatus, ClassCount, DailyAttendance, DashboardStats,
    GradeDistribution, GradeRecord, GradeSummary, RankedStudent, StatusCounts, Student,
    SubjectAverage,
};

pub const DEFAULT_TREND_DAYS: u32 = 7;
pub const DASHBOARD_TREND_DAYS: u32 = 14;
/// Longest daily series the trend widgets render.
pub const MAX_TREND_DAYS: u32 = 366;
pub const DEFAULT_RANKING_LIMIT: usize = 10;

pub fn round_one_decimal(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Mean score rounded to one decimal; `0.0` when there are no scores.
pub fn average_score<I>(scores: I) -> f64
where
    I: IntoIterator<Item = u32>,
{
    let (sum, count) = scores
        .into_iter()
        .fold((0u64, 0u64), |(sum, count), score| (sum + u64::from(score), count + 1));
    if count == 0 {
        0.0
    } else {
        round_one_decimal(sum as f64 / count as f64)
    }
}

pub fn distribution<I>(scores: I) -> GradeDistribution
where
    I: IntoIterator<Item = u32>,
{
    let mut dist = GradeDistribution::default();
    for score in scores {
        match score {
            90.. => dist.a += 1,
            70..=89 => dist.b += 1,
            50..=69 => dist.c += 1,
            30..=49 => dist.d += 1,
            _ => dist.f += 1,
        }
    }
    dist
}

pub fn attendance_on(records: &[AttendanceRecord], day: NaiveDate) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for record in records.iter().filter(|r| r.date == day) {
        counts.record(record.status);
    }
    counts
}

pub fn today_present(records: &[AttendanceRecord], today: NaiveDate) -> u64 {
    attendance_on(records, today).present
}

/// Status totals, optionally restricted to an inclusive date range.
pub fn attendance_summary(
    records: &[AttendanceRecord],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for record in records {
        if start.is_some_and(|start| record.date < start) || end.is_some_and(|end| record.date > end) {
            continue;
        }
        counts.record(record.status);
    }
    counts
}

/// Averages per subject, in order of first appearance.
pub fn subject_averages(grades: &[GradeRecord]) -> Vec<SubjectAverage> {
    let mut groups: IndexMap<&str, Vec<u32>> = IndexMap::new();
    for grade in grades {
        groups.entry(grade.subject.as_str()).or_default().push(grade.score);
    }
    groups
        .into_iter()
        .map(|(subject, scores)| SubjectAverage {
            subject: subject.to_string(),
            count: scores.len(),
            average: average_score(scores),
        })
        .collect()
}

/// One point per day for the `days` days ending at `today`, oldest first.
/// `days` is capped at [`MAX_TREND_DAYS`].
pub fn daily_trend(records: &[AttendanceRecord], days: u32, today: NaiveDate) -> Vec<DailyAttendance> {
    let mut by_day: HashMap<NaiveDate, StatusCounts> = HashMap::new();
    for record in records {
        by_day.entry(record.date).or_default().record(record.status);
    }
    fill_days(&by_day, days, today)
}

fn fill_days(
    by_day: &HashMap<NaiveDate, StatusCounts>,
    days: u32,
    today: NaiveDate,
) -> Vec<DailyAttendance> {
    (0..i64::from(days.min(MAX_TREND_DAYS)))
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            DailyAttendance {
                date,
                counts: by_day.get(&date).copied().unwrap_or_default(),
            }
        })
        .collect()
}

pub fn class_distribution(students: &[Student]) -> Vec<ClassCount> {
    let mut counts: IndexMap<&str, u64> = IndexMap::new();
    for student in students {
        *counts.entry(student.class_name.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(class_name, count)| ClassCount {
            class_name: class_name.to_string(),
            count,
        })
        .collect()
}

/// Students by average score, best first; ties go to the lower id.
pub fn grade_ranking(
    grades: &[GradeRecord],
    directory: &StudentDirectory,
    limit: usize,
) -> Vec<RankedStudent> {
    let mut per_student: HashMap<i64, Vec<u32>> = HashMap::new();
    for grade in grades {
        per_student.entry(grade.student_id).or_default().push(grade.score);
    }

    let mut ranking: Vec<RankedStudent> = per_student
        .into_iter()
        .map(|(student_id, scores)| RankedStudent {
            student_id,
            name: directory.display_name(student_id).to_string(),
            grade_count: scores.len(),
            average: average_score(scores),
        })
        .collect();

    ranking.sort_by(|a, b| {
        b.average
            .partial_cmp(&a.average)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.student_id.cmp(&b.student_id))
    });
    ranking.truncate(limit);
    ranking
}

pub fn grade_summary(grades: &[GradeRecord]) -> GradeSummary {
    GradeSummary {
        total_grades: grades.len() as u64,
        average_score: average_score(grades.iter().map(|g| g.score)),
        highest: grades.iter().map(|g| g.score).max(),
        lowest: grades.iter().map(|g| g.score).min(),
    }
}

/// Pie slices for the attendance widget; zero-valued statuses are dropped.
pub fn attendance_slices(counts: &StatusCounts) -> Vec<(AttendanceStatus, u64)> {
    AttendanceStatus::ALL
        .into_iter()
        .map(|status| (status, counts.get(status)))
        .filter(|(_, value)| *value > 0)
        .collect()
}

/// Client-side dashboard: every figure reduced from the raw collections.
pub fn local_dashboard(
    students: &[Student],
    attendance: &[AttendanceRecord],
    grades: &[GradeRecord],
    today: NaiveDate,
    days: u32,
) -> DashboardStats {
    DashboardStats {
        student_count: students.len() as u64,
        today: attendance_on(attendance, today),
        average_score: average_score(grades.iter().map(|g| g.score)),
        total_grades: grades.len() as u64,
        attendance: attendance_summary(attendance, None, None),
        distribution: distribution(grades.iter().map(|g| g.score)),
        subject_averages: subject_averages(grades),
        daily: daily_trend(attendance, days, today),
        class_distribution: class_distribution(students),
    }
}

// --- gateway payload normalization ---
//
// Stats payloads are treated as untrusted: a missing or mistyped field turns
// into its zero value instead of failing the whole dashboard.

fn count_field(value: &Value, key: &str) -> u64 {
    match value.get(key) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f.round() as u64))
            .unwrap_or(0),
        _ => 0,
    }
}

fn float_field(value: &Value, key: &str) -> f64 {
    value
        .get(key)
        .and_then(Value::as_f64)
        .filter(|f| f.is_finite())
        .unwrap_or(0.0)
}

fn text_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| value.get(*key).and_then(Value::as_str))
}

fn entries(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

pub fn status_counts_from_payload(value: &Value) -> StatusCounts {
    StatusCounts {
        present: count_field(value, "present"),
        late: count_field(value, "late"),
        absent: count_field(value, "absent"),
    }
}

pub fn distribution_from_payload(value: &Value) -> GradeDistribution {
    GradeDistribution {
        a: count_field(value, "A"),
        b: count_field(value, "B"),
        c: count_field(value, "C"),
        d: count_field(value, "D"),
        f: count_field(value, "F"),
    }
}

pub fn subject_averages_from_payload(value: &Value) -> Vec<SubjectAverage> {
    entries(value)
        .iter()
        .filter_map(|entry| {
            let subject = text_field(entry, &["subject"])?;
            Some(SubjectAverage {
                subject: subject.to_string(),
                average: round_one_decimal(float_field(entry, "average")),
                count: count_field(entry, "count") as usize,
            })
        })
        .collect()
}

/// Daily series from the gateway, gap-filled so every requested day appears.
pub fn daily_from_payload(value: &Value, days: u32, today: NaiveDate) -> Vec<DailyAttendance> {
    let by_day: HashMap<NaiveDate, StatusCounts> = entries(value)
        .iter()
        .filter_map(|entry| {
            let date = text_field(entry, &["date"])?.parse::<NaiveDate>().ok()?;
            Some((date, status_counts_from_payload(entry)))
        })
        .collect();
    fill_days(&by_day, days, today)
}

pub fn class_distribution_from_payload(value: &Value) -> Vec<ClassCount> {
    entries(value)
        .iter()
        .filter_map(|entry| {
            Some(ClassCount {
                class_name: text_field(entry, &["class_name"])?.to_string(),
                count: count_field(entry, "count"),
            })
        })
        .collect()
}

pub fn ranking_from_payload(value: &Value) -> Vec<RankedStudent> {
    entries(value)
        .iter()
        .filter_map(|entry| {
            let student_id = entry.get("student_id").and_then(Value::as_i64)?;
            Some(RankedStudent {
                student_id,
                name: text_field(entry, &["name", "student_name"])
                    .unwrap_or(crate::filter::UNKNOWN_STUDENT)
                    .to_string(),
                average: round_one_decimal(float_field(entry, "average")),
                grade_count: count_field(entry, "count") as usize,
            })
        })
        .collect()
}

pub fn grade_summary_from_payload(value: &Value) -> GradeSummary {
    let score = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_f64)
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.round() as u32)
    };
    GradeSummary {
        total_grades: count_field(value, "total_grades"),
        average_score: round_one_decimal(float_field(value, "average_score")),
        highest: score("highest_score"),
        lowest: score("lowest_score"),
    }
}

/// Raw payloads from the five dashboard stats calls.
#[derive(Debug, Clone, Default)]
pub struct DashboardPayloads {
    pub dashboard: Value,
    pub attendance_summary: Value,
    pub by_subject: Value,
    pub distribution: Value,
    pub daily: Value,
}

/// Server-side dashboard: normalizes the gateway's pre-aggregated payloads.
pub fn server_dashboard(payloads: &DashboardPayloads, days: u32, today: NaiveDate) -> DashboardStats {
    let dashboard = &payloads.dashboard;
    DashboardStats {
        student_count: count_field(dashboard, "student_count"),
        today: dashboard
            .get("today_attendance")
            .map(status_counts_from_payload)
            .unwrap_or_default(),
        average_score: round_one_decimal(float_field(dashboard, "average_score")),
        total_grades: count_field(dashboard, "total_grades"),
        attendance: status_counts_from_payload(&payloads.attendance_summary),
        distribution: distribution_from_payload(&payloads.distribution),
        subject_averages: subject_averages_from_payload(&payloads.by_subject),
        daily: daily_from_payload(&payloads.daily, days, today),
        class_distribution: dashboard
            .get("class_distribution")
            .map(class_distribution_from_payload)
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn grade(id: i64, student_id: i64, subject: &str, score: u32) -> GradeRecord {
        GradeRecord {
            id,
            student_id,
            subject: subject.to_string(),
            score,
        }
    }

    fn mark(id: i64, student_id: i64, date: NaiveDate, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            id,
            student_id,
            date,
            status,
        }
    }

    #[test]
    fn average_of_nothing_is_zero() {
        assert_eq!(average_score(Vec::new()), 0.0);
    }

    #[test]
    fn sample_scores_bucket_and_average() {
        let scores = [95, 72, 40];
        assert_eq!(
            distribution(scores),
            GradeDistribution { a: 1, b: 1, c: 0, d: 1, f: 0 }
        );
        assert_eq!(average_score(scores), 69.0);
    }

    #[test]
    fn average_rounds_to_one_decimal() {
        assert_eq!(average_score([90, 85, 70]), 81.7);
        assert_eq!(average_score([1, 2]), 1.5);
        assert_eq!(average_score([100, 99, 99]), 99.3);
    }

    #[test]
    fn bucket_bounds_are_inclusive() {
        let dist = distribution([100, 90, 89, 70, 69, 50, 49, 30, 29, 0]);
        assert_eq!(dist, GradeDistribution { a: 2, b: 2, c: 2, d: 2, f: 2 });
    }

    #[test]
    fn distribution_always_accounts_for_every_score() {
        for scores in [vec![], vec![0], vec![55; 7], (0..=100).collect::<Vec<u32>>()] {
            let dist = distribution(scores.iter().copied());
            assert_eq!(dist.total(), scores.len() as u64);
            assert_eq!(dist.buckets().len(), 5);
        }
    }

    #[test]
    fn today_counts_only_present_on_today() {
        let records = vec![
            mark(1, 1, day(17), AttendanceStatus::Present),
            mark(2, 2, day(17), AttendanceStatus::Late),
            mark(3, 3, day(16), AttendanceStatus::Present),
            mark(4, 4, day(17), AttendanceStatus::Present),
        ];
        assert_eq!(today_present(&records, day(17)), 2);
        assert_eq!(attendance_on(&records, day(17)).late, 1);
        assert_eq!(today_present(&[], day(17)), 0);
    }

    #[test]
    fn subject_groups_keep_first_appearance_order() {
        let grades = vec![
            grade(1, 1, "Math", 90),
            grade(2, 1, "English", 70),
            grade(3, 2, "Math", 81),
            grade(4, 2, "Art", 100),
        ];
        let averages = subject_averages(&grades);
        let subjects: Vec<_> = averages.iter().map(|s| s.subject.as_str()).collect();
        assert_eq!(subjects, ["Math", "English", "Art"]);
        assert_eq!(averages[0].average, 85.5);
        assert_eq!(averages[0].count, 2);
    }

    #[test]
    fn trend_has_one_point_per_day_without_gaps() {
        let records = vec![
            mark(1, 1, day(17), AttendanceStatus::Present),
            mark(2, 2, day(17), AttendanceStatus::Absent),
            mark(3, 1, day(14), AttendanceStatus::Late),
            mark(4, 1, day(1), AttendanceStatus::Late),
        ];
        let trend = daily_trend(&records, 7, day(17));
        assert_eq!(trend.len(), 7);
        assert_eq!(trend.first().unwrap().date, day(11));
        assert_eq!(trend.last().unwrap().date, day(17));
        for pair in trend.windows(2) {
            assert_eq!(pair[1].date - pair[0].date, Duration::days(1));
        }
        assert_eq!(trend[6].counts, StatusCounts { present: 1, late: 0, absent: 1 });
        assert_eq!(trend[3].counts.late, 1);
        assert_eq!(trend[4].counts.total(), 0);

        assert!(daily_trend(&records, 0, day(17)).is_empty());
        assert_eq!(daily_trend(&[], 14, day(17)).len(), 14);
    }

    #[test]
    fn oversized_trend_is_capped_at_a_year() {
        let trend = daily_trend(&[], 200_000_000, day(17));
        assert_eq!(trend.len(), MAX_TREND_DAYS as usize);
        assert_eq!(trend.last().unwrap().date, day(17));

        let payload = serde_json::json!([]);
        assert_eq!(
            daily_from_payload(&payload, u32::MAX, day(17)).len(),
            MAX_TREND_DAYS as usize
        );
    }

    #[test]
    fn summary_honors_date_range() {
        let records = vec![
            mark(1, 1, day(1), AttendanceStatus::Present),
            mark(2, 1, day(5), AttendanceStatus::Late),
            mark(3, 1, day(9), AttendanceStatus::Absent),
        ];
        assert_eq!(attendance_summary(&records, None, None).total(), 3);
        let ranged = attendance_summary(&records, Some(day(5)), Some(day(9)));
        assert_eq!(ranged, StatusCounts { present: 0, late: 1, absent: 1 });
    }

    #[test]
    fn ranking_orders_by_average_then_id() {
        let students = vec![
            Student { id: 1, name: "Kim".into(), student_number: "1".into(), class_name: "1-1".into() },
            Student { id: 2, name: "Lee".into(), student_number: "2".into(), class_name: "1-1".into() },
        ];
        let grades = vec![
            grade(1, 1, "Math", 80),
            grade(2, 2, "Math", 90),
            grade(3, 2, "Art", 70),
            grade(4, 3, "Math", 95),
        ];
        let ranking = grade_ranking(&grades, &StudentDirectory::new(&students), 10);
        let ids: Vec<_> = ranking.iter().map(|r| r.student_id).collect();
        assert_eq!(ids, [3, 1, 2]);
        assert_eq!(ranking[0].name, crate::filter::UNKNOWN_STUDENT);
        assert_eq!(ranking[2].grade_count, 2);

        assert_eq!(grade_ranking(&grades, &StudentDirectory::default(), 1).len(), 1);
    }

    #[test]
    fn pie_drops_empty_slices() {
        let counts = StatusCounts { present: 3, late: 0, absent: 1 };
        assert_eq!(
            attendance_slices(&counts),
            vec![(AttendanceStatus::Present, 3), (AttendanceStatus::Absent, 1)]
        );
        assert!(attendance_slices(&StatusCounts::default()).is_empty());
    }

    #[test]
    fn local_dashboard_reduces_raw_collections() {
        let students = vec![
            Student { id: 1, name: "Kim".into(), student_number: "1".into(), class_name: "1-1".into() },
            Student { id: 2, name: "Lee".into(), student_number: "2".into(), class_name: "1-2".into() },
            Student { id: 3, name: "Park".into(), student_number: "3".into(), class_name: "1-1".into() },
        ];
        let attendance = vec![mark(1, 1, day(17), AttendanceStatus::Present)];
        let grades = vec![grade(1, 1, "Math", 95), grade(2, 2, "Math", 72), grade(3, 3, "Art", 40)];

        let stats = local_dashboard(&students, &attendance, &grades, day(17), 14);
        assert_eq!(stats.student_count, 3);
        assert_eq!(stats.today.present, 1);
        assert_eq!(stats.average_score, 69.0);
        assert_eq!(stats.daily.len(), 14);
        assert_eq!(stats.class_distribution[0], ClassCount { class_name: "1-1".into(), count: 2 });
    }

    #[test]
    fn server_payloads_fill_missing_fields_with_zero() {
        let payloads = DashboardPayloads {
            dashboard: json!({
                "student_count": 30,
                "today_attendance": {"present": 25, "late": "two"},
                "average_score": 78.26,
                "class_distribution": [{"class_name": "1-1", "count": 10}, {"count": 4}]
            }),
            attendance_summary: json!(null),
            by_subject: json!([{"subject": "Math", "average": 81.25}, {"average": 3}]),
            distribution: json!({"A": 3, "B": 7.0, "D": -1}),
            daily: json!([{"date": "2026-10-16", "present": 20}, {"date": "garbage"}]),
        };

        let stats = server_dashboard(&payloads, 7, day(17));
        assert_eq!(stats.student_count, 30);
        assert_eq!(stats.today, StatusCounts { present: 25, late: 0, absent: 0 });
        assert_eq!(stats.average_score, 78.3);
        assert_eq!(stats.total_grades, 0);
        assert_eq!(stats.attendance, StatusCounts::default());
        assert_eq!(stats.distribution, GradeDistribution { a: 3, b: 7, c: 0, d: 0, f: 0 });
        assert_eq!(stats.subject_averages.len(), 1);
        assert_eq!(stats.subject_averages[0].average, 81.3);
        assert_eq!(stats.daily.len(), 7);
        assert_eq!(stats.daily[5].counts.present, 20);
        assert_eq!(stats.class_distribution.len(), 1);
    }

    #[test]
    fn empty_payloads_produce_empty_dashboard() {
        let stats = server_dashboard(&DashboardPayloads::default(), 3, day(17));
        assert_eq!(stats.student_count, 0);
        assert_eq!(stats.average_score, 0.0);
        assert!(stats.subject_averages.is_empty());
        assert_eq!(stats.daily.len(), 3);
    }

    #[test]
    fn ranking_and_summary_payloads_are_normalized() {
        let ranking = ranking_from_payload(&json!([
            {"student_id": 4, "student_name": "Choi", "average": 97.04, "count": 3},
            {"name": "missing id"}
        ]));
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].name, "Choi");
        assert_eq!(ranking[0].average, 97.0);

        let summary = grade_summary_from_payload(&json!({"total_grades": 12, "highest_score": 100.0}));
        assert_eq!(summary.total_grades, 12);
        assert_eq!(summary.highest, Some(100));
        assert_eq!(summary.lowest, None);

        let local = grade_summary(&[grade(1, 1, "Math", 40), grade(2, 1, "Art", 95)]);
        assert_eq!((local.lowest, local.highest), (Some(40), Some(95)));
        assert_eq!(local.average_score, 67.5);
    }
}
