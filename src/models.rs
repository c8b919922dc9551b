use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub student_number: String,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub student_number: String,
    pub class_name: String,
}

/// Partial update body; unset fields are left untouched by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StudentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

impl StudentUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.student_number.is_none() && self.class_name.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 3] = [
        AttendanceStatus::Present,
        AttendanceStatus::Late,
        AttendanceStatus::Absent,
    ];

    /// Value the backend stores for this status.
    pub fn wire_value(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "출석",
            AttendanceStatus::Late => "지각",
            AttendanceStatus::Absent => "결석",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown attendance status '{}' (expected Present, Late or Absent)",
            self.0
        )
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for AttendanceStatus {
    type Err = UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        for status in AttendanceStatus::ALL {
            if trimmed == status.wire_value() || trimmed.eq_ignore_ascii_case(status.label()) {
                return Ok(status);
            }
        }
        Err(UnknownStatus(trimmed.to_string()))
    }
}

impl Serialize for AttendanceStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.wire_value())
    }
}

impl<'de> Deserialize<'de> for AttendanceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAttendance {
    pub student_id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub id: i64,
    pub student_id: i64,
    pub subject: String,
    #[serde(deserialize_with = "score_from_number")]
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGrade {
    pub student_id: i64,
    pub subject: String,
    pub score: u32,
}

/// Scores come back as JSON floats (`95.0`); round them onto the integer scale.
fn score_from_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() || raw < 0.0 {
        return Err(serde::de::Error::custom(format!("invalid score {raw}")));
    }
    Ok(raw.round() as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Teacher,
    #[default]
    Student,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub role: UserRole,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Token {
    pub access_token: String,
    /// Always `bearer` from this backend; login refuses anything else.
    pub token_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub present: u64,
    pub late: u64,
    pub absent: u64,
}

impl StatusCounts {
    pub fn record(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Absent => self.absent += 1,
        }
    }

    pub fn get(&self, status: AttendanceStatus) -> u64 {
        match status {
            AttendanceStatus::Present => self.present,
            AttendanceStatus::Late => self.late,
            AttendanceStatus::Absent => self.absent,
        }
    }

    pub fn total(&self) -> u64 {
        self.present + self.late + self.absent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyAttendance {
    pub date: NaiveDate,
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GradeDistribution {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
    pub f: u64,
}

impl GradeDistribution {
    /// Buckets in display order, zero counts included.
    pub fn buckets(&self) -> [(&'static str, u64); 5] {
        [
            ("A", self.a),
            ("B", self.b),
            ("C", self.c),
            ("D", self.d),
            ("F", self.f),
        ]
    }

    pub fn total(&self) -> u64 {
        self.a + self.b + self.c + self.d + self.f
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectAverage {
    pub subject: String,
    pub average: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassCount {
    pub class_name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedStudent {
    pub student_id: i64,
    pub name: String,
    pub average: f64,
    pub grade_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GradeSummary {
    pub total_grades: u64,
    pub average_score: f64,
    pub highest: Option<u32>,
    pub lowest: Option<u32>,
}

/// Everything the dashboard renders, whichever side computed it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashboardStats {
    pub student_count: u64,
    pub today: StatusCounts,
    pub average_score: f64,
    pub total_grades: u64,
    pub attendance: StatusCounts,
    pub distribution: GradeDistribution,
    pub subject_averages: Vec<SubjectAverage>,
    pub daily: Vec<DailyAttendance>,
    pub class_distribution: Vec<ClassCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_backend_values() {
        let record: AttendanceRecord = serde_json::from_str(
            r#"{"id": 1, "student_id": 2, "date": "2026-03-02", "status": "지각"}"#,
        )
        .unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);

        let body = serde_json::to_value(NewAttendance {
            student_id: 2,
            date: record.date,
            status: AttendanceStatus::Absent,
        })
        .unwrap();
        assert_eq!(body["status"], "결석");
        assert_eq!(body["date"], "2026-03-02");
    }

    #[test]
    fn status_parses_english_names_case_insensitively() {
        assert_eq!("present".parse(), Ok(AttendanceStatus::Present));
        assert_eq!(" LATE ".parse(), Ok(AttendanceStatus::Late));
        assert_eq!("출석".parse(), Ok(AttendanceStatus::Present));
        assert!("tardy".parse::<AttendanceStatus>().is_err());
    }

    #[test]
    fn grade_score_accepts_float_payloads() {
        let grade: GradeRecord = serde_json::from_str(
            r#"{"id": 4, "student_id": 1, "subject": "Math", "score": 88.0}"#,
        )
        .unwrap();
        assert_eq!(grade.score, 88);

        let bad = serde_json::from_str::<GradeRecord>(
            r#"{"id": 4, "student_id": 1, "subject": "Math", "score": -3}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn student_update_omits_unset_fields() {
        let update = StudentUpdate {
            class_name: Some("3-2".to_string()),
            ..Default::default()
        };
        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body, serde_json::json!({"class_name": "3-2"}));
        assert!(StudentUpdate::default().is_empty());
    }

    #[test]
    fn distribution_lists_every_bucket() {
        let dist = GradeDistribution {
            a: 2,
            ..Default::default()
        };
        let labels: Vec<_> = dist.buckets().iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, ["A", "B", "C", "D", "F"]);
        assert_eq!(dist.total(), 2);
    }
}
