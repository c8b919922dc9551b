use std::fmt::Write;
use std::future::Future;
use std::io::BufRead;

use tracing::info;

use crate::api::Gateway;
use crate::error::GatewayError;
use crate::filter::{EmptyState, ListView, StudentDirectory};
use crate::models::{AttendanceRecord, GradeRecord, RankedStudent, Student};

/// Asks the user before an irreversible action.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Reads a y/N answer from stdin.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        eprint!("{prompt} [y/N] ");
        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
    }
}

/// `--yes` on the command line.
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

#[derive(Debug, PartialEq)]
pub enum DeleteOutcome<T> {
    Cancelled,
    /// The record is gone; carries the refreshed list.
    Deleted(T),
}

/// Confirms, deletes, then reloads the list. Both futures are lazy, so a
/// declined confirmation never reaches the gateway.
pub async fn confirm_delete<T, D, R>(
    confirm: &dyn Confirm,
    prompt: &str,
    delete: D,
    refresh: R,
) -> Result<DeleteOutcome<T>, GatewayError>
where
    D: Future<Output = Result<(), GatewayError>>,
    R: Future<Output = Result<T, GatewayError>>,
{
    if !confirm.confirm(prompt) {
        info!("delete cancelled");
        return Ok(DeleteOutcome::Cancelled);
    }
    delete.await?;
    let refreshed = refresh.await?;
    Ok(DeleteOutcome::Deleted(refreshed))
}

/// Students together with attendance; fails as a whole if either call fails.
pub async fn load_attendance_page(
    gateway: &Gateway,
    student_id: Option<i64>,
) -> Result<(Vec<Student>, Vec<AttendanceRecord>), GatewayError> {
    tokio::try_join!(gateway.list_students(), gateway.list_attendance(student_id))
}

/// Students together with grades; fails as a whole if either call fails.
pub async fn load_grade_page(
    gateway: &Gateway,
    student_id: Option<i64>,
) -> Result<(Vec<Student>, Vec<GradeRecord>), GatewayError> {
    tokio::try_join!(gateway.list_students(), gateway.list_grades(student_id))
}

fn empty_message(state: EmptyState, noun: &str) -> String {
    match state {
        EmptyState::NoRecords => format!("No {noun} registered."),
        EmptyState::NoResults => "No results match the current filters.".to_string(),
    }
}

fn footer<T>(output: &mut String, view: &ListView<T>) {
    let _ = writeln!(output, "Showing {} of {} records", view.rows.len(), view.total);
}

pub fn render_students(view: &ListView<Student>) -> String {
    let mut output = String::new();
    if let Some(state) = view.empty_state() {
        let _ = writeln!(output, "{}", empty_message(state, "students"));
        footer(&mut output, view);
        return output;
    }

    let _ = writeln!(output, "{:>5}  {:<20} {:<12} {:<8}", "ID", "Name", "Number", "Class");
    for student in &view.rows {
        let _ = writeln!(
            output,
            "{:>5}  {:<20} {:<12} {:<8}",
            student.id, student.name, student.student_number, student.class_name
        );
    }
    footer(&mut output, view);
    output
}

pub fn render_attendance(view: &ListView<AttendanceRecord>, directory: &StudentDirectory) -> String {
    let mut output = String::new();
    if let Some(state) = view.empty_state() {
        let _ = writeln!(output, "{}", empty_message(state, "attendance records"));
        footer(&mut output, view);
        return output;
    }

    let _ = writeln!(output, "{:>5}  {:<20} {:<10} {:<8}", "ID", "Student", "Date", "Status");
    for record in &view.rows {
        let _ = writeln!(
            output,
            "{:>5}  {:<20} {:<10} {:<8}",
            record.id,
            directory.display_name(record.student_id),
            record.date,
            record.status.label()
        );
    }
    footer(&mut output, view);
    output
}

pub fn render_grades(view: &ListView<GradeRecord>, directory: &StudentDirectory) -> String {
    let mut output = String::new();
    if let Some(state) = view.empty_state() {
        let _ = writeln!(output, "{}", empty_message(state, "grades"));
        footer(&mut output, view);
        return output;
    }

    let _ = writeln!(output, "{:>5}  {:<20} {:<16} {:>5}", "ID", "Student", "Subject", "Score");
    for grade in &view.rows {
        let _ = writeln!(
            output,
            "{:>5}  {:<20} {:<16} {:>5}",
            grade.id,
            directory.display_name(grade.student_id),
            grade.subject,
            grade.score
        );
    }
    footer(&mut output, view);
    output
}

pub fn render_ranking(ranking: &[RankedStudent]) -> String {
    let mut output = String::new();
    if ranking.is_empty() {
        let _ = writeln!(output, "No grades recorded yet.");
        return output;
    }
    for (position, entry) in ranking.iter().enumerate() {
        let _ = writeln!(
            output,
            "{:>3}. {} (#{}) average {:.1} across {} grades",
            position + 1,
            entry.name,
            entry.student_id,
            entry.average,
            entry.grade_count
        );
    }
    output
}
