//! Synchronous SQL for the student-class-history ledger.

use chrono::{DateTime, Utc};
use raport_core::ledger::{HistoryEntry, MissingStudent, NewHistoryEntry, NotesUpdate};
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::{
  Result,
  encode::{HISTORY_COLUMNS, HISTORY_FROM, RawHistory, encode_dt, encode_kind},
};

/// Append a ledger row. No existence checks beyond the foreign keys; callers
/// validate references first so failures surface as not-found errors.
pub fn insert_entry(
  conn: &Connection,
  input: &NewHistoryEntry,
  promotion_log_id: Option<i64>,
  now: DateTime<Utc>,
) -> Result<HistoryEntry> {
  conn.execute(
    "INSERT INTO student_class_history (
       student_id, period_id, class_id, kind, note,
       academic_note, behavioral_note, promotion_log_id, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    params![
      input.student_id,
      input.period_id,
      input.class_id,
      encode_kind(input.kind),
      input.note,
      input.academic_note,
      input.behavioral_note,
      promotion_log_id,
      encode_dt(now),
    ],
  )?;
  let id = conn.last_insert_rowid();
  get_entry(conn, id)?.ok_or_else(|| raport_core::Error::HistoryNotFound(id).into())
}

pub fn get_entry(conn: &Connection, id: i64) -> Result<Option<HistoryEntry>> {
  query_one(conn, "h.id = ?1", params![id], "")
}

/// Latest row for `(student, period)`.
pub fn find_assignment(
  conn: &Connection,
  student_id: i64,
  period_id: i64,
) -> Result<Option<HistoryEntry>> {
  query_one(
    conn,
    "h.student_id = ?1 AND h.period_id = ?2",
    params![student_id, period_id],
    "ORDER BY h.created_at DESC, h.id DESC",
  )
}

pub fn find_earliest(conn: &Connection, student_id: i64) -> Result<Option<HistoryEntry>> {
  query_one(
    conn,
    "h.student_id = ?1",
    params![student_id],
    "ORDER BY h.created_at ASC, h.id ASC",
  )
}

pub fn find_latest(conn: &Connection, student_id: i64) -> Result<Option<HistoryEntry>> {
  query_one(
    conn,
    "h.student_id = ?1",
    params![student_id],
    "ORDER BY h.created_at DESC, h.id DESC",
  )
}

pub fn student_history(conn: &Connection, student_id: i64) -> Result<Vec<HistoryEntry>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {HISTORY_COLUMNS} FROM {HISTORY_FROM}
     WHERE h.student_id = ?1
     ORDER BY h.created_at ASC, h.id ASC"
  ))?;
  let raws = stmt
    .query_map(params![student_id], RawHistory::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawHistory::into_entry).collect()
}

fn query_one(
  conn: &Connection,
  condition: &str,
  params: &[&dyn rusqlite::ToSql],
  order: &str,
) -> Result<Option<HistoryEntry>> {
  conn
    .query_row(
      &format!("SELECT {HISTORY_COLUMNS} FROM {HISTORY_FROM} WHERE {condition} {order} LIMIT 1"),
      params,
      RawHistory::from_row,
    )
    .optional()?
    .map(RawHistory::into_entry)
    .transpose()
}

/// Students (optionally filtered by current class and/or id) that have no
/// ledger row in any period of `academic_year_id`.
pub fn list_missing(
  conn: &Connection,
  academic_year_id: i64,
  class_id: Option<i64>,
  student_id: Option<i64>,
) -> Result<Vec<MissingStudent>> {
  let mut stmt = conn.prepare(
    "SELECT s.id, s.name, s.enrollment_number, s.current_class_id, c.name
     FROM students s
     LEFT JOIN classes c ON c.id = s.current_class_id
     WHERE (?2 IS NULL OR s.current_class_id = ?2)
       AND (?3 IS NULL OR s.id = ?3)
       AND NOT EXISTS (
         SELECT 1 FROM student_class_history h
         JOIN periods p ON p.id = h.period_id
         WHERE h.student_id = s.id AND p.academic_year_id = ?1
       )
     ORDER BY c.name, s.name, s.id",
  )?;
  let rows = stmt
    .query_map(params![academic_year_id, class_id, student_id], |row| {
      Ok(MissingStudent {
        student_id:        row.get(0)?,
        name:              row.get(1)?,
        enrollment_number: row.get(2)?,
        class_id:          row.get(3)?,
        class_name:        row.get(4)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

/// Overwrite only the note columns that are present in `update`. Returns
/// `None` for an unknown entry before looking at the update itself.
pub fn update_notes(
  conn: &Connection,
  history_id: i64,
  update: &NotesUpdate,
) -> Result<Option<HistoryEntry>> {
  if get_entry(conn, history_id)?.is_none() {
    return Ok(None);
  }
  if update.is_empty() {
    let msg = "at least one note must be provided".to_owned();
    return Err(raport_core::Error::Validation(msg).into());
  }
  conn.execute(
    "UPDATE student_class_history
     SET academic_note   = CASE WHEN ?2 THEN ?3 ELSE academic_note END,
         behavioral_note = CASE WHEN ?4 THEN ?5 ELSE behavioral_note END
     WHERE id = ?1",
    params![
      history_id,
      update.academic_note.is_some(),
      update.academic_note.clone().flatten(),
      update.behavioral_note.is_some(),
      update.behavioral_note.clone().flatten(),
    ],
  )?;
  get_entry(conn, history_id)
}

/// Fill `students.enrollment_year_id` from each student's earliest ledger row.
pub fn backfill_enrollment_years(conn: &Connection) -> Result<usize> {
  let mut stmt = conn.prepare("SELECT id FROM students WHERE enrollment_year_id IS NULL")?;
  let ids = stmt
    .query_map([], |row| row.get::<_, i64>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut updated = 0;
  for id in ids {
    if let Some(first) = find_earliest(conn, id)? {
      conn.execute(
        "UPDATE students SET enrollment_year_id = ?2 WHERE id = ?1",
        params![id, first.academic_year_id],
      )?;
      updated += 1;
    }
  }
  Ok(updated)
}
