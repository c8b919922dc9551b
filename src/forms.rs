//! Raw text form input and its coercion into gateway request bodies.
//! A form that fails to coerce never reaches the gateway.

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{AttendanceStatus, NewAttendance, NewGrade, NewStudent, StudentUpdate};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("{field} must be a whole number, got '{value}'")]
    NotANumber { field: &'static str, value: String },
    #[error("score must be between 0 and 100, got {0}")]
    ScoreOutOfRange(i64),
    #[error("student id must be positive, got {0}")]
    InvalidStudentId(i64),
    #[error("date must look like YYYY-MM-DD, got '{0}'")]
    InvalidDate(String),
    #[error("{0}")]
    InvalidStatus(String),
    #[error("nothing to update")]
    NoChanges,
}

fn required(field: &'static str, raw: &str) -> Result<String, FormError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(FormError::Missing { field })
    } else {
        Ok(trimmed.to_string())
    }
}

fn parse_int(field: &'static str, raw: &str) -> Result<i64, FormError> {
    let trimmed = required(field, raw)?;
    trimmed.parse().map_err(|_| FormError::NotANumber {
        field,
        value: trimmed,
    })
}

pub fn parse_student_id(raw: &str) -> Result<i64, FormError> {
    let id = parse_int("student id", raw)?;
    if id <= 0 {
        return Err(FormError::InvalidStudentId(id));
    }
    Ok(id)
}

pub fn parse_score(raw: &str) -> Result<u32, FormError> {
    let score = parse_int("score", raw)?;
    u32::try_from(score)
        .ok()
        .filter(|s| *s <= 100)
        .ok_or(FormError::ScoreOutOfRange(score))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, FormError> {
    let trimmed = required("date", raw)?;
    NaiveDate::parse_from_str(&trimmed, "%Y-%m-%d").map_err(|_| FormError::InvalidDate(trimmed))
}

pub fn parse_status(raw: &str) -> Result<AttendanceStatus, FormError> {
    let trimmed = required("status", raw)?;
    trimmed
        .parse()
        .map_err(|err: crate::models::UnknownStatus| FormError::InvalidStatus(err.to_string()))
}

#[derive(Debug, Clone, Default)]
pub struct StudentForm {
    pub name: String,
    pub student_number: String,
    pub class_name: String,
}

impl TryFrom<StudentForm> for NewStudent {
    type Error = FormError;

    fn try_from(form: StudentForm) -> Result<Self, Self::Error> {
        Ok(NewStudent {
            name: required("name", &form.name)?,
            student_number: required("student number", &form.student_number)?,
            class_name: required("class", &form.class_name)?,
        })
    }
}

/// Edit form: only the fields the user touched are sent.
#[derive(Debug, Clone, Default)]
pub struct StudentEditForm {
    pub name: Option<String>,
    pub student_number: Option<String>,
    pub class_name: Option<String>,
}

impl TryFrom<StudentEditForm> for StudentUpdate {
    type Error = FormError;

    fn try_from(form: StudentEditForm) -> Result<Self, Self::Error> {
        let update = StudentUpdate {
            name: form.name.as_deref().map(|v| required("name", v)).transpose()?,
            student_number: form
                .student_number
                .as_deref()
                .map(|v| required("student number", v))
                .transpose()?,
            class_name: form
                .class_name
                .as_deref()
                .map(|v| required("class", v))
                .transpose()?,
        };
        if update.is_empty() {
            return Err(FormError::NoChanges);
        }
        Ok(update)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceForm {
    pub student_id: String,
    pub date: String,
    pub status: String,
}

impl TryFrom<AttendanceForm> for NewAttendance {
    type Error = FormError;

    fn try_from(form: AttendanceForm) -> Result<Self, Self::Error> {
        Ok(NewAttendance {
            student_id: parse_student_id(&form.student_id)?,
            date: parse_date(&form.date)?,
            status: parse_status(&form.status)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct GradeForm {
    pub student_id: String,
    pub subject: String,
    pub score: String,
}

impl TryFrom<GradeForm> for NewGrade {
    type Error = FormError;

    fn try_from(form: GradeForm) -> Result<Self, Self::Error> {
        Ok(NewGrade {
            student_id: parse_student_id(&form.student_id)?,
            subject: required("subject", &form.subject)?,
            score: parse_score(&form.score)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_form_coerces_text_numbers() {
        let grade = NewGrade::try_from(GradeForm {
            student_id: " 12 ".to_string(),
            subject: "Math".to_string(),
            score: "87".to_string(),
        })
        .unwrap();
        assert_eq!(
            grade,
            NewGrade {
                student_id: 12,
                subject: "Math".to_string(),
                score: 87
            }
        );
    }

    #[test]
    fn score_must_be_in_range() {
        assert_eq!(parse_score("100"), Ok(100));
        assert_eq!(parse_score("0"), Ok(0));
        assert_eq!(parse_score("101"), Err(FormError::ScoreOutOfRange(101)));
        assert_eq!(parse_score("-1"), Err(FormError::ScoreOutOfRange(-1)));
        assert!(matches!(parse_score("9.5"), Err(FormError::NotANumber { .. })));
        assert_eq!(parse_score(""), Err(FormError::Missing { field: "score" }));
    }

    #[test]
    fn attendance_form_validates_every_field() {
        let ok = NewAttendance::try_from(AttendanceForm {
            student_id: "3".to_string(),
            date: "2026-10-17".to_string(),
            status: "late".to_string(),
        })
        .unwrap();
        assert_eq!(ok.status, AttendanceStatus::Late);
        assert_eq!(ok.date, NaiveDate::from_ymd_opt(2026, 10, 17).unwrap());

        let bad_id = NewAttendance::try_from(AttendanceForm {
            student_id: "0".to_string(),
            date: "2026-10-17".to_string(),
            status: "late".to_string(),
        });
        assert_eq!(bad_id, Err(FormError::InvalidStudentId(0)));

        let bad_date = NewAttendance::try_from(AttendanceForm {
            student_id: "3".to_string(),
            date: "17/10/2026".to_string(),
            status: "late".to_string(),
        });
        assert!(matches!(bad_date, Err(FormError::InvalidDate(_))));

        let bad_status = parse_status("skipped");
        assert!(matches!(bad_status, Err(FormError::InvalidStatus(_))));
    }

    #[test]
    fn student_forms_require_content() {
        let missing = NewStudent::try_from(StudentForm {
            name: "Kim".to_string(),
            student_number: "  ".to_string(),
            class_name: "1-1".to_string(),
        });
        assert_eq!(missing, Err(FormError::Missing { field: "student number" }));

        let untouched = StudentUpdate::try_from(StudentEditForm::default());
        assert_eq!(untouched, Err(FormError::NoChanges));

        let rename = StudentUpdate::try_from(StudentEditForm {
            name: Some(" Kim Ara ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(rename.name.as_deref(), Some("Kim Ara"));
        assert!(rename.class_name.is_none());
    }
}
