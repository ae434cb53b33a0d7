//! Period and class registry: academic years, semesters, classes, students.
//!
//! These are the read-mostly reference records the promotion engine resolves
//! against. A student's `current_class_id` is a cache of the latest ledger
//! entry, mutated only by promotion runs or an explicit administrative edit.

use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Status & semester ───────────────────────────────────────────────────────

/// Whether an academic year or period is the one currently in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationStatus {
  Active,
  #[default]
  Inactive,
}

impl ActivationStatus {
  pub fn is_active(&self) -> bool { matches!(self, Self::Active) }
}

/// One of the two semesters of an academic year. Serialised as `1` / `2`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub enum Semester {
  First,
  Second,
}

impl Semester {
  pub fn number(self) -> i64 {
    match self {
      Self::First => 1,
      Self::Second => 2,
    }
  }
}

impl TryFrom<i64> for Semester {
  type Error = Error;

  fn try_from(n: i64) -> Result<Self> {
    match n {
      1 => Ok(Self::First),
      2 => Ok(Self::Second),
      other => Err(Error::InvalidSemester(other)),
    }
  }
}

impl From<Semester> for i64 {
  fn from(s: Semester) -> Self { s.number() }
}

impl fmt::Display for Semester {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.number())
  }
}

// ─── Academic year & period ──────────────────────────────────────────────────

/// A school year, e.g. `"2024/2025"`. Owns one or more [`Period`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicYear {
  pub id:         i64,
  pub label:      String,
  pub status:     ActivationStatus,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAcademicYear {
  pub label:  String,
  pub status: ActivationStatus,
}

/// One semester within an [`AcademicYear`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
  pub id:               i64,
  pub academic_year_id: i64,
  pub semester:         Semester,
  pub label:            String,
  pub status:           ActivationStatus,
  pub created_at:       DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPeriod {
  pub academic_year_id: i64,
  pub semester:         Semester,
  /// Defaults to `"<year label> Semester <n>"` when absent.
  pub label:            Option<String>,
  pub status:           ActivationStatus,
}

/// How a caller names the academic year when resolving a period.
///
/// Legacy clients send either the numeric id or a free-text label, and the
/// label may name the year (`"2024/2025"`) or the period itself
/// (`"2024/2025 Semester 1"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodRef {
  AcademicYearId(i64),
  Label(String),
}

impl PeriodRef {
  /// The reference read as a label. A numeric reference may also be a label
  /// such as `"2024"`, tried when no academic year has that id.
  pub fn label_text(&self) -> String {
    match self {
      Self::AcademicYearId(id) => id.to_string(),
      Self::Label(l) => l.clone(),
    }
  }
}

impl FromStr for PeriodRef {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let s = s.trim();
    if s.is_empty() {
      return Err(Error::Validation("academic year reference is empty".into()));
    }
    Ok(match s.parse::<i64>() {
      Ok(id) => Self::AcademicYearId(id),
      Err(_) => Self::Label(s.to_owned()),
    })
  }
}

impl fmt::Display for PeriodRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::AcademicYearId(id) => write!(f, "academic year #{id}"),
      Self::Label(l) => write!(f, "{l:?}"),
    }
  }
}

// ─── Classes ─────────────────────────────────────────────────────────────────

/// A class/section. `next_class_id` names the class its students move into
/// under automatic promotion; terminal (graduating) classes leave it unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRoom {
  pub id:                  i64,
  pub name:                String,
  pub capacity:            Option<i64>,
  pub homeroom_teacher_id: Option<i64>,
  pub next_class_id:       Option<i64>,
  pub created_at:          DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewClassRoom {
  pub name:                String,
  pub capacity:            Option<i64>,
  pub homeroom_teacher_id: Option<i64>,
  pub next_class_id:       Option<i64>,
}

// ─── Students ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
  pub id:                 i64,
  /// Unique enrollment number (NIS).
  pub enrollment_number:  String,
  pub name:               String,
  pub gender:             Option<String>,
  pub birth_date:         Option<NaiveDate>,
  /// Cache of the latest ledger entry's class.
  pub current_class_id:   Option<i64>,
  pub current_room_id:    Option<i64>,
  /// The academic year the student first enrolled in.
  pub enrollment_year_id: Option<i64>,
  pub created_at:         DateTime<Utc>,
}

/// Input for [`RaportStore::enroll_student`](crate::store::RaportStore::enroll_student).
///
/// When both `class_id` and `period_id` are set, an `enrolled` ledger entry
/// is appended for that period in the same transaction.
#[derive(Debug, Clone)]
pub struct NewStudent {
  pub enrollment_number: String,
  pub name:              String,
  pub gender:            Option<String>,
  pub birth_date:        Option<NaiveDate>,
  pub class_id:          Option<i64>,
  pub room_id:           Option<i64>,
  pub period_id:         Option<i64>,
}

impl NewStudent {
  pub fn new(enrollment_number: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      enrollment_number: enrollment_number.into(),
      name:              name.into(),
      gender:            None,
      birth_date:        None,
      class_id:          None,
      room_id:           None,
      period_id:         None,
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.enrollment_number.trim().is_empty() {
      return Err(Error::Validation("enrollment number is required".into()));
    }
    if self.name.trim().is_empty() {
      return Err(Error::Validation("student name is required".into()));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn period_ref_parses_numeric_ids() {
    assert_eq!("12".parse::<PeriodRef>().unwrap(), PeriodRef::AcademicYearId(12));
    assert_eq!(
      " 2024/2025 ".parse::<PeriodRef>().unwrap(),
      PeriodRef::Label("2024/2025".into())
    );
    assert!("  ".parse::<PeriodRef>().is_err());
  }

  #[test]
  fn semester_serialises_as_number() {
    assert_eq!(serde_json::to_string(&Semester::Second).unwrap(), "2");
    let s: Semester = serde_json::from_str("1").unwrap();
    assert_eq!(s, Semester::First);
    assert!(serde_json::from_str::<Semester>("3").is_err());
  }
}
