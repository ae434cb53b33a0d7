//! Repair of missing ledger rows.

use chrono::{DateTime, Utc};
use raport_core::ledger::{BACKFILL_NOTE, BackfillReport, BackfillRequest, EntryKind, NewHistoryEntry};
use rusqlite::Connection;

use crate::{Result, ledger, registry};

/// Write a `repair` row for every matching student with no ledger row in the
/// requested year, using their current class. Repeating the call is a no-op
/// because repaired students stop matching.
pub fn run(
  conn: &Connection,
  request: &BackfillRequest,
  now: DateTime<Utc>,
) -> Result<BackfillReport> {
  let year = registry::require_academic_year(conn, request.academic_year_id)?;
  let period = registry::default_period_of_year(conn, year.id)?
    .ok_or(raport_core::Error::AcademicYearWithoutPeriods(year.id))?;
  if let Some(class_id) = request.class_id {
    registry::require_class(conn, class_id)?;
  }
  if let Some(student_id) = request.student_id {
    registry::require_student(conn, student_id)?;
  }

  let missing = ledger::list_missing(conn, year.id, request.class_id, request.student_id)?;

  let mut created_count = 0;
  let mut unrepairable = Vec::new();
  for student in missing {
    let Some(class_id) = student.class_id else {
      tracing::warn!(
        student_id = student.student_id,
        academic_year_id = year.id,
        "student has no current class, cannot backfill"
      );
      unrepairable.push(student.student_id);
      continue;
    };
    let entry = NewHistoryEntry::new(student.student_id, period.id, class_id, EntryKind::Repair)
      .with_note(BACKFILL_NOTE);
    ledger::insert_entry(conn, &entry, None, now)?;
    created_count += 1;
  }

  tracing::info!(
    academic_year_id = year.id,
    period_id = period.id,
    created = created_count,
    unrepairable = unrepairable.len(),
    "ledger backfill finished"
  );

  Ok(BackfillReport {
    academic_year_id: year.id,
    period_id: period.id,
    created_count,
    unrepairable,
  })
}
