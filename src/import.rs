use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use crate::api::Gateway;
use crate::error::GENERIC_SAVE_FAILURE;
use crate::forms::{GradeForm, StudentForm};
use crate::models::{NewGrade, NewStudent};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    /// Row number (1-based, header excluded) and the reason it was skipped.
    pub skipped: Vec<(usize, String)>,
}

#[derive(serde::Deserialize)]
struct StudentRow {
    name: String,
    student_number: String,
    class_name: String,
}

/// Grade rows keep numbers as text so they go through the same coercion
/// as interactive input.
#[derive(serde::Deserialize)]
struct GradeRow {
    student_id: String,
    subject: String,
    score: String,
}

pub fn read_students(reader: impl std::io::Read) -> anyhow::Result<Vec<Result<NewStudent, String>>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for result in csv_reader.deserialize::<StudentRow>() {
        let row = result.context("malformed student CSV")?;
        rows.push(
            NewStudent::try_from(StudentForm {
                name: row.name,
                student_number: row.student_number,
                class_name: row.class_name,
            })
            .map_err(|err| err.to_string()),
        );
    }
    Ok(rows)
}

pub fn read_grades(reader: impl std::io::Read) -> anyhow::Result<Vec<Result<NewGrade, String>>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for result in csv_reader.deserialize::<GradeRow>() {
        let row = result.context("malformed grade CSV")?;
        rows.push(
            NewGrade::try_from(GradeForm {
                student_id: row.student_id,
                subject: row.subject,
                score: row.score,
            })
            .map_err(|err| err.to_string()),
        );
    }
    Ok(rows)
}

pub async fn import_students(gateway: &Gateway, csv_path: &Path) -> anyhow::Result<ImportSummary> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = read_students(file)?;
    let mut summary = ImportSummary::default();

    for (index, row) in rows.into_iter().enumerate() {
        let line = index + 1;
        let student = match row {
            Ok(student) => student,
            Err(reason) => {
                warn!(line, %reason, "skipping invalid student row");
                summary.skipped.push((line, reason));
                continue;
            }
        };
        match gateway.create_student(&student).await {
            Ok(created) => {
                info!(id = created.id, number = %created.student_number, "student imported");
                summary.created += 1;
            }
            Err(err) if err.is_unauthorized() => return Err(err.into()),
            Err(err) => {
                let reason = err.user_message(GENERIC_SAVE_FAILURE);
                warn!(line, error = %err, "student import rejected");
                summary.skipped.push((line, reason));
            }
        }
    }

    Ok(summary)
}

pub async fn import_grades(gateway: &Gateway, csv_path: &Path) -> anyhow::Result<ImportSummary> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = read_grades(file)?;
    let mut summary = ImportSummary::default();

    for (index, row) in rows.into_iter().enumerate() {
        let line = index + 1;
        let grade = match row {
            Ok(grade) => grade,
            Err(reason) => {
                warn!(line, %reason, "skipping invalid grade row");
                summary.skipped.push((line, reason));
                continue;
            }
        };
        match gateway.create_grade(&grade).await {
            Ok(created) => {
                info!(id = created.id, student_id = created.student_id, "grade imported");
                summary.created += 1;
            }
            Err(err) if err.is_unauthorized() => return Err(err.into()),
            Err(err) => {
                let reason = err.user_message(GENERIC_SAVE_FAILURE);
                warn!(line, error = %err, "grade import rejected");
                summary.skipped.push((line, reason));
            }
        }
    }

    Ok(summary)
}
