//! Client-side list filtering.
//!
//! Every criteria type is a plain value; [`apply`] is a pure function of the
//! collection and the criteria, re-run by the caller whenever either changes.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::{AttendanceRecord, AttendanceStatus, GradeRecord, Student};

/// Display name for a foreign key with no matching student.
pub const UNKNOWN_STUDENT: &str = "unknown";

/// Lookup from student id to name for cross-entity criteria.
#[derive(Debug, Clone, Default)]
pub struct StudentDirectory {
    names: HashMap<i64, String>,
}

impl StudentDirectory {
    pub fn new(students: &[Student]) -> Self {
        Self {
            names: students
                .iter()
                .map(|student| (student.id, student.name.clone()))
                .collect(),
        }
    }

    pub fn resolve(&self, student_id: i64) -> Option<&str> {
        self.names.get(&student_id).map(String::as_str)
    }

    pub fn display_name(&self, student_id: i64) -> &str {
        self.resolve(student_id).unwrap_or(UNKNOWN_STUDENT)
    }
}

pub trait Criteria<T> {
    /// True when no field constrains the collection.
    fn is_unconstrained(&self) -> bool;

    fn matches(&self, item: &T, directory: &StudentDirectory) -> bool;
}

/// Returns the items satisfying every active field, in their original order.
pub fn apply<T, C>(items: &[T], criteria: &C, directory: &StudentDirectory) -> Vec<T>
where
    T: Clone,
    C: Criteria<T>,
{
    if criteria.is_unconstrained() {
        return items.to_vec();
    }
    items
        .iter()
        .filter(|item| criteria.matches(item, directory))
        .cloned()
        .collect()
}

fn active(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Case-insensitive substring rule for text fields; unset needle matches.
fn text_matches(needle: &Option<String>, haystack: &str) -> bool {
    match active(needle) {
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}

/// Text rule applied to a resolved foreign key. Unresolved keys never match
/// an active filter.
fn resolved_matches(needle: &Option<String>, resolved: Option<&str>) -> bool {
    match active(needle) {
        Some(_) => resolved.is_some_and(|name| text_matches(needle, name)),
        None => true,
    }
}

fn exact_matches<V: PartialEq>(expected: &Option<V>, actual: &V) -> bool {
    expected.as_ref().map_or(true, |expected| expected == actual)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentCriteria {
    pub name: Option<String>,
    pub student_number: Option<String>,
    pub class_name: Option<String>,
}

impl Criteria<Student> for StudentCriteria {
    fn is_unconstrained(&self) -> bool {
        active(&self.name).is_none()
            && active(&self.student_number).is_none()
            && active(&self.class_name).is_none()
    }

    fn matches(&self, student: &Student, _directory: &StudentDirectory) -> bool {
        text_matches(&self.name, &student.name)
            && text_matches(&self.student_number, &student.student_number)
            && text_matches(&self.class_name, &student.class_name)
    }
}

/// Status constraint with an explicit "match any" value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(AttendanceStatus),
}

impl std::str::FromStr for StatusFilter {
    type Err = crate::models::UnknownStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(StatusFilter::All);
        }
        trimmed.parse().map(StatusFilter::Only)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceCriteria {
    pub student_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub status: StatusFilter,
}

impl Criteria<AttendanceRecord> for AttendanceCriteria {
    fn is_unconstrained(&self) -> bool {
        active(&self.student_name).is_none()
            && self.date.is_none()
            && self.status == StatusFilter::All
    }

    fn matches(&self, record: &AttendanceRecord, directory: &StudentDirectory) -> bool {
        let status_ok = match self.status {
            StatusFilter::All => true,
            StatusFilter::Only(status) => status == record.status,
        };
        status_ok
            && exact_matches(&self.date, &record.date)
            && resolved_matches(&self.student_name, directory.resolve(record.student_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GradeCriteria {
    pub student_name: Option<String>,
    pub subject: Option<String>,
}

impl Criteria<GradeRecord> for GradeCriteria {
    fn is_unconstrained(&self) -> bool {
        active(&self.student_name).is_none() && active(&self.subject).is_none()
    }

    fn matches(&self, grade: &GradeRecord, directory: &StudentDirectory) -> bool {
        text_matches(&self.subject, &grade.subject)
            && resolved_matches(&self.student_name, directory.resolve(grade.student_id))
    }
}

/// Why a rendered list has no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyState {
    /// The source collection itself is empty.
    NoRecords,
    /// The source has rows but none survive the criteria.
    NoResults,
}

/// Filtered rows plus the size of the source they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ListView<T> {
    pub rows: Vec<T>,
    pub total: usize,
}

impl<T: Clone> ListView<T> {
    pub fn build<C: Criteria<T>>(items: &[T], criteria: &C, directory: &StudentDirectory) -> Self {
        Self {
            rows: apply(items, criteria, directory),
            total: items.len(),
        }
    }

    pub fn empty_state(&self) -> Option<EmptyState> {
        if !self.rows.is_empty() {
            None
        } else if self.total == 0 {
            Some(EmptyState::NoRecords)
        } else {
            Some(EmptyState::NoResults)
        }
    }
}
