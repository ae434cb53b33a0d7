//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as ISO 8601, and
//! enums as lowercase text. Each `Raw*` struct mirrors one `SELECT` column
//! list (the matching `*_COLUMNS` constant) and is decoded after the
//! connection closure returns.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use raport_core::{
  ledger::{EntryKind, HistoryEntry},
  promotion::{PromotionLog, PromotionMode, PromotionOutcome, PromotionStatus},
  registry::{AcademicYear, ActivationStatus, ClassRoom, Period, Semester, Student},
};
use rusqlite::Row;

use crate::{Error, Result};

// ─── DateTime<Utc> / NaiveDate ───────────────────────────────────────────────

/// Fixed-width UTC form, so text order in SQL matches time order.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_status(s: ActivationStatus) -> &'static str {
  match s {
    ActivationStatus::Active => "active",
    ActivationStatus::Inactive => "inactive",
  }
}

pub fn decode_status(s: &str) -> Result<ActivationStatus> {
  match s {
    "active" => Ok(ActivationStatus::Active),
    "inactive" => Ok(ActivationStatus::Inactive),
    other => Err(unknown("status", other)),
  }
}

pub fn encode_kind(k: EntryKind) -> &'static str {
  match k {
    EntryKind::Enrolled => "enrolled",
    EntryKind::Promoted => "promoted",
    EntryKind::HeldBack => "held_back",
    EntryKind::Repair => "repair",
    EntryKind::Manual => "manual",
  }
}

pub fn decode_kind(s: &str) -> Result<EntryKind> {
  match s {
    "enrolled" => Ok(EntryKind::Enrolled),
    "promoted" => Ok(EntryKind::Promoted),
    "held_back" => Ok(EntryKind::HeldBack),
    "repair" => Ok(EntryKind::Repair),
    "manual" => Ok(EntryKind::Manual),
    other => Err(unknown("kind", other)),
  }
}

pub fn decode_mode(s: &str) -> Result<PromotionMode> {
  match s {
    "auto" => Ok(PromotionMode::Auto),
    "manual" => Ok(PromotionMode::Manual),
    "explicit" => Ok(PromotionMode::Explicit),
    other => Err(unknown("mode", other)),
  }
}

pub fn decode_promotion_status(s: &str) -> Result<PromotionStatus> {
  s.parse().map_err(|_| unknown("status", s))
}

pub fn decode_semester(n: i64) -> Result<Semester> { Ok(Semester::try_from(n)?) }

fn unknown(column: &'static str, value: &str) -> Error {
  Error::UnknownValue { column, value: value.to_owned() }
}

fn decode_count(n: i64) -> usize { usize::try_from(n).unwrap_or(0) }

// ─── Academic years ──────────────────────────────────────────────────────────

pub const YEAR_COLUMNS: &str = "id, label, status, created_at";

pub struct RawYear {
  pub id:         i64,
  pub label:      String,
  pub status:     String,
  pub created_at: String,
}

impl RawYear {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      label:      row.get(1)?,
      status:     row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_year(self) -> Result<AcademicYear> {
    Ok(AcademicYear {
      id:         self.id,
      label:      self.label,
      status:     decode_status(&self.status)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── Periods ─────────────────────────────────────────────────────────────────

pub const PERIOD_COLUMNS: &str =
  "p.id, p.academic_year_id, p.semester, p.label, p.status, p.created_at";

pub struct RawPeriod {
  pub id:               i64,
  pub academic_year_id: i64,
  pub semester:         i64,
  pub label:            String,
  pub status:           String,
  pub created_at:       String,
}

impl RawPeriod {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      academic_year_id: row.get(1)?,
      semester:         row.get(2)?,
      label:            row.get(3)?,
      status:           row.get(4)?,
      created_at:       row.get(5)?,
    })
  }

  pub fn into_period(self) -> Result<Period> {
    Ok(Period {
      id:               self.id,
      academic_year_id: self.academic_year_id,
      semester:         decode_semester(self.semester)?,
      label:            self.label,
      status:           decode_status(&self.status)?,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

// ─── Classes ─────────────────────────────────────────────────────────────────

pub const CLASS_COLUMNS: &str =
  "id, name, capacity, homeroom_teacher_id, next_class_id, created_at";

pub struct RawClass {
  pub id:                  i64,
  pub name:                String,
  pub capacity:            Option<i64>,
  pub homeroom_teacher_id: Option<i64>,
  pub next_class_id:       Option<i64>,
  pub created_at:          String,
}

impl RawClass {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                  row.get(0)?,
      name:                row.get(1)?,
      capacity:            row.get(2)?,
      homeroom_teacher_id: row.get(3)?,
      next_class_id:       row.get(4)?,
      created_at:          row.get(5)?,
    })
  }

  pub fn into_class(self) -> Result<ClassRoom> {
    Ok(ClassRoom {
      id:                  self.id,
      name:                self.name,
      capacity:            self.capacity,
      homeroom_teacher_id: self.homeroom_teacher_id,
      next_class_id:       self.next_class_id,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

// ─── Students ────────────────────────────────────────────────────────────────

pub const STUDENT_COLUMNS: &str = "id, enrollment_number, name, gender, birth_date, \
   current_class_id, current_room_id, enrollment_year_id, created_at";

pub struct RawStudent {
  pub id:                 i64,
  pub enrollment_number:  String,
  pub name:               String,
  pub gender:             Option<String>,
  pub birth_date:         Option<String>,
  pub current_class_id:   Option<i64>,
  pub current_room_id:    Option<i64>,
  pub enrollment_year_id: Option<i64>,
  pub created_at:         String,
}

impl RawStudent {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                 row.get(0)?,
      enrollment_number:  row.get(1)?,
      name:               row.get(2)?,
      gender:             row.get(3)?,
      birth_date:         row.get(4)?,
      current_class_id:   row.get(5)?,
      current_room_id:    row.get(6)?,
      enrollment_year_id: row.get(7)?,
      created_at:         row.get(8)?,
    })
  }

  pub fn into_student(self) -> Result<Student> {
    Ok(Student {
      id:                 self.id,
      enrollment_number:  self.enrollment_number,
      name:               self.name,
      gender:             self.gender,
      birth_date:         self.birth_date.as_deref().map(decode_date).transpose()?,
      current_class_id:   self.current_class_id,
      current_room_id:    self.current_room_id,
      enrollment_year_id: self.enrollment_year_id,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// Ledger columns joined with the owning period (alias `h` / `p`).
pub const HISTORY_COLUMNS: &str = "h.id, h.student_id, h.period_id, p.academic_year_id, \
   p.semester, h.class_id, h.kind, h.note, h.academic_note, h.behavioral_note, \
   h.promotion_log_id, h.created_at";

pub const HISTORY_FROM: &str =
  "student_class_history h JOIN periods p ON p.id = h.period_id";

pub struct RawHistory {
  pub id:               i64,
  pub student_id:       i64,
  pub period_id:        i64,
  pub academic_year_id: i64,
  pub semester:         i64,
  pub class_id:         i64,
  pub kind:             String,
  pub note:             Option<String>,
  pub academic_note:    Option<String>,
  pub behavioral_note:  Option<String>,
  pub promotion_log_id: Option<i64>,
  pub created_at:       String,
}

impl RawHistory {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      student_id:       row.get(1)?,
      period_id:        row.get(2)?,
      academic_year_id: row.get(3)?,
      semester:         row.get(4)?,
      class_id:         row.get(5)?,
      kind:             row.get(6)?,
      note:             row.get(7)?,
      academic_note:    row.get(8)?,
      behavioral_note:  row.get(9)?,
      promotion_log_id: row.get(10)?,
      created_at:       row.get(11)?,
    })
  }

  pub fn into_entry(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      id:               self.id,
      student_id:       self.student_id,
      period_id:        self.period_id,
      academic_year_id: self.academic_year_id,
      semester:         decode_semester(self.semester)?,
      class_id:         self.class_id,
      kind:             decode_kind(&self.kind)?,
      note:             self.note,
      academic_note:    self.academic_note,
      behavioral_note:  self.behavioral_note,
      promotion_log_id: self.promotion_log_id,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}

// ─── Promotion log & outcomes ────────────────────────────────────────────────

/// Log columns joined with both periods (alias `l`, `fp`, `tp`).
pub const LOG_COLUMNS: &str = "l.id, fp.academic_year_id, l.from_period_id, \
   tp.academic_year_id, l.to_period_id, l.source_class_id, l.target_class_id, l.mode, \
   l.executed_by, l.note, l.promoted_count, l.held_back_count, l.idempotency_key, \
   l.created_at";

pub const LOG_FROM: &str = "promotion_logs l \
   JOIN periods fp ON fp.id = l.from_period_id \
   JOIN periods tp ON tp.id = l.to_period_id";

pub struct RawLog {
  pub id:                    i64,
  pub from_academic_year_id: i64,
  pub from_period_id:        i64,
  pub to_academic_year_id:   i64,
  pub to_period_id:          i64,
  pub source_class_id:       i64,
  pub target_class_id:       Option<i64>,
  pub mode:                  String,
  pub executed_by:           Option<i64>,
  pub note:                  Option<String>,
  pub promoted_count:        i64,
  pub held_back_count:       i64,
  pub idempotency_key:       Option<String>,
  pub created_at:            String,
}

impl RawLog {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                    row.get(0)?,
      from_academic_year_id: row.get(1)?,
      from_period_id:        row.get(2)?,
      to_academic_year_id:   row.get(3)?,
      to_period_id:          row.get(4)?,
      source_class_id:       row.get(5)?,
      target_class_id:       row.get(6)?,
      mode:                  row.get(7)?,
      executed_by:           row.get(8)?,
      note:                  row.get(9)?,
      promoted_count:        row.get(10)?,
      held_back_count:       row.get(11)?,
      idempotency_key:       row.get(12)?,
      created_at:            row.get(13)?,
    })
  }

  pub fn into_log(self) -> Result<PromotionLog> {
    Ok(PromotionLog {
      id:                    self.id,
      from_academic_year_id: self.from_academic_year_id,
      from_period_id:        self.from_period_id,
      to_academic_year_id:   self.to_academic_year_id,
      to_period_id:          self.to_period_id,
      source_class_id:       self.source_class_id,
      target_class_id:       self.target_class_id,
      mode:                  decode_mode(&self.mode)?,
      executed_by:           self.executed_by,
      note:                  self.note,
      promoted_count:        decode_count(self.promoted_count),
      held_back_count:       decode_count(self.held_back_count),
      idempotency_key:       self.idempotency_key,
      created_at:            decode_dt(&self.created_at)?,
    })
  }
}

pub const OUTCOME_COLUMNS: &str = "id, promotion_log_id, student_id, status, \
   from_class_id, to_class_id, history_id, created_at";

pub struct RawOutcome {
  pub id:               i64,
  pub promotion_log_id: i64,
  pub student_id:       i64,
  pub status:           String,
  pub from_class_id:    i64,
  pub to_class_id:      i64,
  pub history_id:       i64,
  pub created_at:       String,
}

impl RawOutcome {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      promotion_log_id: row.get(1)?,
      student_id:       row.get(2)?,
      status:           row.get(3)?,
      from_class_id:    row.get(4)?,
      to_class_id:      row.get(5)?,
      history_id:       row.get(6)?,
      created_at:       row.get(7)?,
    })
  }

  pub fn into_outcome(self) -> Result<PromotionOutcome> {
    Ok(PromotionOutcome {
      id:               self.id,
      promotion_log_id: self.promotion_log_id,
      student_id:       self.student_id,
      status:           decode_promotion_status(&self.status)?,
      from_class_id:    self.from_class_id,
      to_class_id:      self.to_class_id,
      history_id:       self.history_id,
      created_at:       decode_dt(&self.created_at)?,
    })
  }
}
