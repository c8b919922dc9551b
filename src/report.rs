use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::DashboardStats;
use crate::stats;

const BAR_WIDTH: u64 = 30;

fn bar(value: u64, max: u64) -> String {
    if max == 0 {
        return String::new();
    }
    let width = (value * BAR_WIDTH + max - 1) / max;
    "#".repeat(width as usize)
}

fn share(value: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        stats::round_one_decimal(value as f64 * 100.0 / total as f64)
    }
}

pub fn build_dashboard(stats: &DashboardStats, source: &str, today: NaiveDate) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Dashboard");
    let _ = writeln!(output, "Generated {today} from {source} statistics");
    let _ = writeln!(output);
    let _ = writeln!(output, "| Total Students | Today Present | Average Score | Total Records |");
    let _ = writeln!(output, "|---|---|---|---|");
    let _ = writeln!(
        output,
        "| {} | {} | {:.1} | {} |",
        stats.student_count, stats.today.present, stats.average_score, stats.total_grades
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance Overview");
    let slices = stats::attendance_slices(&stats.attendance);
    if slices.is_empty() {
        let _ = writeln!(output, "No data");
    } else {
        let total = stats.attendance.total();
        for (status, count) in slices {
            let _ = writeln!(
                output,
                "- {}: {} ({:.1}%)",
                status,
                count,
                share(count, total)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Grade Distribution ({} graded)",
        stats.distribution.total()
    );
    let buckets = stats.distribution.buckets();
    let max = buckets.iter().map(|(_, count)| *count).max().unwrap_or(0);
    for (label, count) in buckets {
        let _ = writeln!(output, "- {label}: {count:>4} {}", bar(count, max));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance Trend");
    if stats.daily.iter().all(|point| point.counts.total() == 0) {
        let _ = writeln!(output, "No data");
    } else {
        let _ = writeln!(output, "| Date | Present | Late | Absent |");
        let _ = writeln!(output, "|---|---|---|---|");
        for point in &stats.daily {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                point.date, point.counts.present, point.counts.late, point.counts.absent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Averages");
    if stats.subject_averages.is_empty() {
        let _ = writeln!(output, "No data");
    } else {
        for subject in &stats.subject_averages {
            let _ = writeln!(
                output,
                "- {}: {:.1} {}",
                subject.subject,
                subject.average,
                bar(subject.average.round() as u64, 100)
            );
        }
    }

    if !stats.class_distribution.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Students by Class");
        for class in &stats.class_distribution {
            let _ = writeln!(output, "- {}: {}", class.class_name, class.count);
        }
    }

    output
}
