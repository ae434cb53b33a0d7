//! Synchronous SQL for academic years, periods, classes and students.
//!
//! Every function takes a plain `&Connection`; callers that need atomicity
//! pass a `Transaction` (which derefs to one).

use chrono::{DateTime, Utc};
use raport_core::{
  ledger::{EntryKind, NewHistoryEntry},
  registry::{
    AcademicYear, ClassRoom, NewAcademicYear, NewClassRoom, NewPeriod,
    NewStudent, Period, PeriodRef, Semester, Student,
  },
};
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::{
  Result,
  encode::{
    CLASS_COLUMNS, PERIOD_COLUMNS, RawClass, RawPeriod, RawStudent, RawYear, STUDENT_COLUMNS,
    YEAR_COLUMNS, encode_date, encode_dt, encode_status,
  },
  ledger,
};

// ─── Academic years ──────────────────────────────────────────────────────────

pub fn insert_academic_year(
  conn: &Connection,
  input: &NewAcademicYear,
  now: DateTime<Utc>,
) -> Result<AcademicYear> {
  let label = input.label.trim();
  if label.is_empty() {
    return Err(raport_core::Error::Validation("academic year label is required".into()).into());
  }
  if find_year_by_label(conn, label)?.is_some() {
    return Err(
      raport_core::Error::Validation(format!("academic year {label:?} already exists")).into(),
    );
  }
  conn.execute(
    "INSERT INTO academic_years (label, status, created_at) VALUES (?1, ?2, ?3)",
    params![label, encode_status(input.status), encode_dt(now)],
  )?;
  let id = conn.last_insert_rowid();
  require_academic_year(conn, id)
}

pub fn get_academic_year(conn: &Connection, id: i64) -> Result<Option<AcademicYear>> {
  conn
    .query_row(
      &format!("SELECT {YEAR_COLUMNS} FROM academic_years WHERE id = ?1"),
      params![id],
      RawYear::from_row,
    )
    .optional()?
    .map(RawYear::into_year)
    .transpose()
}

pub fn require_academic_year(conn: &Connection, id: i64) -> Result<AcademicYear> {
  get_academic_year(conn, id)?
    .ok_or_else(|| raport_core::Error::AcademicYearNotFound(id.to_string()).into())
}

fn find_year_by_label(conn: &Connection, label: &str) -> Result<Option<AcademicYear>> {
  conn
    .query_row(
      &format!("SELECT {YEAR_COLUMNS} FROM academic_years WHERE label = ?1"),
      params![label],
      RawYear::from_row,
    )
    .optional()?
    .map(RawYear::into_year)
    .transpose()
}

pub fn list_academic_years(conn: &Connection) -> Result<Vec<AcademicYear>> {
  let mut stmt =
    conn.prepare(&format!("SELECT {YEAR_COLUMNS} FROM academic_years ORDER BY label DESC"))?;
  let raws = stmt
    .query_map([], RawYear::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawYear::into_year).collect()
}

// ─── Periods ─────────────────────────────────────────────────────────────────

pub fn insert_period(
  conn: &Connection,
  input: &NewPeriod,
  now: DateTime<Utc>,
) -> Result<Period> {
  let year = require_academic_year(conn, input.academic_year_id)?;
  if period_of_year(conn, year.id, input.semester)?.is_some() {
    return Err(
      raport_core::Error::Validation(format!(
        "academic year {:?} already has a semester {} period",
        year.label, input.semester
      ))
      .into(),
    );
  }

  let label = input
    .label
    .as_deref()
    .map(str::trim)
    .filter(|l| !l.is_empty())
    .map(str::to_owned)
    .unwrap_or_else(|| format!("{} Semester {}", year.label, input.semester));

  conn.execute(
    "INSERT INTO periods (academic_year_id, semester, label, status, created_at)
     VALUES (?1, ?2, ?3, 'inactive', ?4)",
    params![year.id, input.semester.number(), label, encode_dt(now)],
  )?;
  let id = conn.last_insert_rowid();

  if input.status.is_active() {
    activate_period(conn, id)
  } else {
    require_period(conn, id)
  }
}

/// Make `id` the only active period, and its year the only active year.
pub fn activate_period(conn: &Connection, id: i64) -> Result<Period> {
  let period = require_period(conn, id)?;
  conn.execute(
    "UPDATE periods SET status = 'inactive' WHERE status = 'active' AND id != ?1",
    params![id],
  )?;
  conn.execute("UPDATE periods SET status = 'active' WHERE id = ?1", params![id])?;
  conn.execute(
    "UPDATE academic_years SET status = CASE WHEN id = ?1 THEN 'active' ELSE 'inactive' END",
    params![period.academic_year_id],
  )?;
  require_period(conn, id)
}

pub fn get_period(conn: &Connection, id: i64) -> Result<Option<Period>> {
  conn
    .query_row(
      &format!("SELECT {PERIOD_COLUMNS} FROM periods p WHERE p.id = ?1"),
      params![id],
      RawPeriod::from_row,
    )
    .optional()?
    .map(RawPeriod::into_period)
    .transpose()
}

pub fn require_period(conn: &Connection, id: i64) -> Result<Period> {
  get_period(conn, id)?
    .ok_or_else(|| raport_core::Error::PeriodNotFound(format!("#{id}")).into())
}

pub fn list_periods(conn: &Connection, academic_year_id: Option<i64>) -> Result<Vec<Period>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PERIOD_COLUMNS} FROM periods p
     WHERE ?1 IS NULL OR p.academic_year_id = ?1
     ORDER BY p.academic_year_id, p.semester"
  ))?;
  let raws = stmt
    .query_map(params![academic_year_id], RawPeriod::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawPeriod::into_period).collect()
}

fn period_of_year(conn: &Connection, year_id: i64, semester: Semester) -> Result<Option<Period>> {
  conn
    .query_row(
      &format!(
        "SELECT {PERIOD_COLUMNS} FROM periods p WHERE p.academic_year_id = ?1 AND p.semester = ?2"
      ),
      params![year_id, semester.number()],
      RawPeriod::from_row,
    )
    .optional()?
    .map(RawPeriod::into_period)
    .transpose()
}

/// The year's active period, else its highest-semester period.
pub fn default_period_of_year(conn: &Connection, year_id: i64) -> Result<Option<Period>> {
  conn
    .query_row(
      &format!(
        "SELECT {PERIOD_COLUMNS} FROM periods p
         WHERE p.academic_year_id = ?1
         ORDER BY (p.status = 'active') DESC, p.semester DESC
         LIMIT 1"
      ),
      params![year_id],
      RawPeriod::from_row,
    )
    .optional()?
    .map(RawPeriod::into_period)
    .transpose()
}

fn period_by_label(conn: &Connection, label: &str) -> Result<Option<Period>> {
  conn
    .query_row(
      &format!("SELECT {PERIOD_COLUMNS} FROM periods p WHERE p.label = ?1 ORDER BY p.id LIMIT 1"),
      params![label],
      RawPeriod::from_row,
    )
    .optional()?
    .map(RawPeriod::into_period)
    .transpose()
}

/// Resolve `(year id | year label | period label, semester?)` to a period.
pub fn resolve_period(
  conn: &Connection,
  reference: &PeriodRef,
  semester: Option<Semester>,
) -> Result<Period> {
  let not_found = || {
    let what = match semester {
      Some(s) => format!("{reference} semester {s}"),
      None => reference.to_string(),
    };
    crate::Error::from(raport_core::Error::PeriodNotFound(what))
  };

  let label = reference.label_text();
  let year = match reference {
    PeriodRef::AcademicYearId(id) => get_academic_year(conn, *id)?,
    PeriodRef::Label(_) => None,
  };
  let year = match year {
    Some(year) => Some(year),
    None => find_year_by_label(conn, &label)?,
  };

  if let Some(year) = year {
    let period = match semester {
      Some(s) => period_of_year(conn, year.id, s)?,
      None => default_period_of_year(conn, year.id)?,
    };
    return period.ok_or_else(not_found);
  }

  // The label may name the period itself rather than its year.
  if let Some(period) = period_by_label(conn, &label)? {
    return match semester {
      Some(s) if s != period.semester => Err(not_found()),
      _ => Ok(period),
    };
  }

  Err(not_found())
}

// ─── Classes ─────────────────────────────────────────────────────────────────

pub fn insert_class(
  conn: &Connection,
  input: &NewClassRoom,
  now: DateTime<Utc>,
) -> Result<ClassRoom> {
  if input.name.trim().is_empty() {
    return Err(raport_core::Error::Validation("class name is required".into()).into());
  }
  if let Some(next) = input.next_class_id {
    require_class(conn, next)?;
  }
  conn.execute(
    "INSERT INTO classes (name, capacity, homeroom_teacher_id, next_class_id, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![
      input.name.trim(),
      input.capacity,
      input.homeroom_teacher_id,
      input.next_class_id,
      encode_dt(now),
    ],
  )?;
  require_class(conn, conn.last_insert_rowid())
}

pub fn get_class(conn: &Connection, id: i64) -> Result<Option<ClassRoom>> {
  conn
    .query_row(
      &format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = ?1"),
      params![id],
      RawClass::from_row,
    )
    .optional()?
    .map(RawClass::into_class)
    .transpose()
}

pub fn require_class(conn: &Connection, id: i64) -> Result<ClassRoom> {
  get_class(conn, id)?.ok_or_else(|| raport_core::Error::ClassNotFound(id).into())
}

pub fn list_classes(conn: &Connection) -> Result<Vec<ClassRoom>> {
  let mut stmt = conn.prepare(&format!("SELECT {CLASS_COLUMNS} FROM classes ORDER BY name, id"))?;
  let raws = stmt
    .query_map([], RawClass::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawClass::into_class).collect()
}

pub fn set_successor(conn: &Connection, class_id: i64, next: Option<i64>) -> Result<ClassRoom> {
  require_class(conn, class_id)?;
  if let Some(next) = next {
    if next == class_id {
      return Err(
        raport_core::Error::Validation(format!("class {class_id} cannot succeed itself")).into(),
      );
    }
    require_class(conn, next)?;
  }
  conn.execute(
    "UPDATE classes SET next_class_id = ?2 WHERE id = ?1",
    params![class_id, next],
  )?;
  require_class(conn, class_id)
}

/// Single-hop successor lookup; `None` for terminal classes.
pub fn successor_of(conn: &Connection, class_id: i64) -> Result<Option<ClassRoom>> {
  match require_class(conn, class_id)?.next_class_id {
    Some(next) => get_class(conn, next),
    None => Ok(None),
  }
}

// ─── Students ────────────────────────────────────────────────────────────────

/// Insert a student and, when both class and period are given, their
/// `enrolled` ledger row.
pub fn insert_student(conn: &Connection, input: &NewStudent, now: DateTime<Utc>) -> Result<Student> {
  input.validate()?;

  let enrollment_number = input.enrollment_number.trim();
  let taken: bool = conn
    .query_row(
      "SELECT 1 FROM students WHERE enrollment_number = ?1",
      params![enrollment_number],
      |_| Ok(true),
    )
    .optional()?
    .unwrap_or(false);
  if taken {
    return Err(
      raport_core::Error::Validation(format!(
        "enrollment number {enrollment_number:?} is already in use"
      ))
      .into(),
    );
  }

  if let Some(class_id) = input.class_id {
    require_class(conn, class_id)?;
  }
  let period = input.period_id.map(|id| require_period(conn, id)).transpose()?;

  conn.execute(
    "INSERT INTO students (
       enrollment_number, name, gender, birth_date,
       current_class_id, current_room_id, enrollment_year_id, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      enrollment_number,
      input.name.trim(),
      input.gender,
      input.birth_date.map(encode_date),
      input.class_id,
      input.room_id,
      period.as_ref().map(|p| p.academic_year_id),
      encode_dt(now),
    ],
  )?;
  let id = conn.last_insert_rowid();

  if let (Some(class_id), Some(period)) = (input.class_id, period) {
    let entry = NewHistoryEntry::new(id, period.id, class_id, EntryKind::Enrolled)
      .with_note("enrolled");
    ledger::insert_entry(conn, &entry, None, now)?;
  }

  require_student(conn, id)
}

pub fn get_student(conn: &Connection, id: i64) -> Result<Option<Student>> {
  conn
    .query_row(
      &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?1"),
      params![id],
      RawStudent::from_row,
    )
    .optional()?
    .map(RawStudent::into_student)
    .transpose()
}

pub fn require_student(conn: &Connection, id: i64) -> Result<Student> {
  get_student(conn, id)?.ok_or_else(|| raport_core::Error::StudentNotFound(id).into())
}

pub fn list_students(conn: &Connection, class_id: Option<i64>) -> Result<Vec<Student>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {STUDENT_COLUMNS} FROM students
     WHERE ?1 IS NULL OR current_class_id = ?1
     ORDER BY name, id"
  ))?;
  let raws = stmt
    .query_map(params![class_id], RawStudent::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawStudent::into_student).collect()
}

/// Point the student's current-class cache at `class_id`.
pub fn set_current_class(conn: &Connection, student_id: i64, class_id: i64) -> Result<()> {
  conn.execute(
    "UPDATE students SET current_class_id = ?2 WHERE id = ?1",
    params![student_id, class_id],
  )?;
  Ok(())
}
