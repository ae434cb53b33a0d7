//! The promotion transaction.
//!
//! [`run`] executes one promotion run against an open transaction. It never
//! commits; the caller commits on `Ok` and lets the transaction roll back on
//! `Err`, so a failed run leaves no ledger rows, pointer updates or audit row
//! behind.

use chrono::{DateTime, Utc};
use raport_core::{
  ledger::{EntryKind, NewHistoryEntry},
  promotion::{
    PromotionCommand, PromotionLog, PromotionOutcome, PromotionReport, PromotionStatus,
    RosterEntry, Selection, plan,
  },
};
use rusqlite::{Connection, OptionalExtension as _, params};

use crate::{
  Result,
  encode::{LOG_COLUMNS, LOG_FROM, OUTCOME_COLUMNS, RawLog, RawOutcome, encode_dt},
  ledger, registry,
};

pub fn run(
  conn: &Connection,
  command: &PromotionCommand,
  now: DateTime<Utc>,
) -> Result<PromotionReport> {
  command.validate()?;

  if let Some(key) = &command.idempotency_key
    && let Some(existing) = find_log_by_key(conn, key)?
  {
    let same_request = existing.from_period_id == command.from_period_id
      && existing.to_period_id == command.to_period_id
      && existing.source_class_id == command.source_class_id
      && existing.mode == command.selection.mode();
    if !same_request {
      return Err(
        raport_core::Error::Validation(format!(
          "idempotency key {key:?} already used for a different promotion (log {})",
          existing.id
        ))
        .into(),
      );
    }
    tracing::info!(
      log_id = existing.id,
      idempotency_key = %key,
      "promotion already executed, replaying earlier result"
    );
    let outcomes = outcomes_of(conn, existing.id)?;
    return Ok(PromotionReport { log: existing, outcomes, skipped: vec![], replayed: true });
  }

  let from = registry::require_period(conn, command.from_period_id)?;
  let to = registry::require_period(conn, command.to_period_id)?;
  let source = registry::require_class(conn, command.source_class_id)?;
  for class_id in command.selection.requested_destinations() {
    registry::require_class(conn, class_id)?;
  }

  // The audit row exists even when nobody ends up promoted.
  conn.execute(
    "INSERT INTO promotion_logs (
       from_period_id, to_period_id, source_class_id, mode,
       executed_by, note, idempotency_key, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      from.id,
      to.id,
      source.id,
      command.selection.mode().as_str(),
      command.executed_by,
      command.note,
      command.idempotency_key,
      encode_dt(now),
    ],
  )?;
  let log_id = conn.last_insert_rowid();

  let roster = load_roster(conn, command)?;
  let plan = plan(command, &roster, |class_id| {
    (class_id == source.id).then_some(source.next_class_id).flatten()
  });

  for skip in &plan.skipped {
    tracing::warn!(
      log_id,
      student_id = skip.student_id,
      reason = ?skip.reason,
      "cannot route student, skipped"
    );
  }

  let mut outcomes = Vec::with_capacity(plan.moves.len());
  for mv in &plan.moves {
    let kind = match mv.status {
      PromotionStatus::Naik => EntryKind::Promoted,
      PromotionStatus::Tinggal => EntryKind::HeldBack,
    };
    let entry = NewHistoryEntry::new(mv.student_id, to.id, mv.to_class_id, kind)
      .with_note(mv.ledger_note());
    let entry = ledger::insert_entry(conn, &entry, Some(log_id), now)?;

    if mv.status == PromotionStatus::Naik {
      registry::set_current_class(conn, mv.student_id, mv.to_class_id)?;
    }

    conn.execute(
      "INSERT INTO promotion_outcomes (
         promotion_log_id, student_id, status, from_class_id, to_class_id,
         history_id, created_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
      params![
        log_id,
        mv.student_id,
        mv.status.as_str(),
        mv.from_class_id,
        mv.to_class_id,
        entry.id,
        encode_dt(now),
      ],
    )?;
    tracing::debug!(
      log_id,
      student_id = mv.student_id,
      status = %mv.status,
      from_class_id = mv.from_class_id,
      to_class_id = mv.to_class_id,
      "student routed"
    );
    outcomes.push(PromotionOutcome {
      id:               conn.last_insert_rowid(),
      promotion_log_id: log_id,
      student_id:       mv.student_id,
      status:           mv.status,
      from_class_id:    mv.from_class_id,
      to_class_id:      mv.to_class_id,
      history_id:       entry.id,
      created_at:       now,
    });
  }

  let target_class_id = match command.selection {
    Selection::Auto => plan.common_destination().or(source.next_class_id),
    _ => plan.common_destination(),
  };
  conn.execute(
    "UPDATE promotion_logs
     SET promoted_count = ?2, held_back_count = ?3, target_class_id = ?4
     WHERE id = ?1",
    params![
      log_id,
      plan.promoted_count() as i64,
      plan.held_back_count() as i64,
      target_class_id,
    ],
  )?;

  let log = require_log(conn, log_id)?;
  tracing::info!(
    log_id,
    from_period_id = from.id,
    to_period_id = to.id,
    source_class_id = source.id,
    mode = command.selection.mode().as_str(),
    promoted = log.promoted_count,
    held_back = log.held_back_count,
    skipped = plan.skipped.len(),
    "promotion run applied"
  );

  Ok(PromotionReport { log, outcomes, skipped: plan.skipped, replayed: false })
}

/// Students taking part. For `auto`/`manual` runs these are the students who
/// sat in the source class during the source period: their latest ledger row
/// for that period names the class, or they have no such row and are in the
/// class now, or an earlier run from that period already moved them out of
/// it. Explicit runs take the caller's list, each of which must exist.
fn load_roster(conn: &Connection, command: &PromotionCommand) -> Result<Vec<RosterEntry>> {
  let source = command.source_class_id;
  match &command.selection {
    Selection::Auto | Selection::Manual(_) => {
      let mut stmt = conn.prepare(
        "SELECT s.id FROM students s
         WHERE (
             SELECT h.class_id FROM student_class_history h
             WHERE h.student_id = s.id AND h.period_id = ?1
             ORDER BY h.created_at DESC, h.id DESC LIMIT 1
           ) = ?2
           OR (
             s.current_class_id = ?2 AND NOT EXISTS (
               SELECT 1 FROM student_class_history h
               WHERE h.student_id = s.id AND h.period_id = ?1
             )
           )
           OR EXISTS (
             SELECT 1 FROM promotion_outcomes o
             JOIN promotion_logs l ON l.id = o.promotion_log_id
             WHERE o.student_id = s.id AND l.from_period_id = ?1 AND o.from_class_id = ?2
           )
         ORDER BY s.id",
      )?;
      let rows = stmt
        .query_map(params![command.from_period_id, source], |row| {
          Ok(RosterEntry { student_id: row.get(0)?, class_id: source })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    }
    Selection::Explicit(decisions) => decisions
      .iter()
      .map(|d| {
        let student = registry::require_student(conn, d.student_id)?;
        Ok(RosterEntry { student_id: student.id, class_id: source })
      })
      .collect(),
  }
}

// ─── Audit log reads ─────────────────────────────────────────────────────────

pub fn get_log(conn: &Connection, id: i64) -> Result<Option<PromotionLog>> {
  conn
    .query_row(
      &format!("SELECT {LOG_COLUMNS} FROM {LOG_FROM} WHERE l.id = ?1"),
      params![id],
      RawLog::from_row,
    )
    .optional()?
    .map(RawLog::into_log)
    .transpose()
}

fn require_log(conn: &Connection, id: i64) -> Result<PromotionLog> {
  get_log(conn, id)?.ok_or_else(|| raport_core::Error::PromotionLogNotFound(id).into())
}

fn find_log_by_key(conn: &Connection, key: &str) -> Result<Option<PromotionLog>> {
  conn
    .query_row(
      &format!("SELECT {LOG_COLUMNS} FROM {LOG_FROM} WHERE l.idempotency_key = ?1"),
      params![key],
      RawLog::from_row,
    )
    .optional()?
    .map(RawLog::into_log)
    .transpose()
}

/// All runs, newest first.
pub fn list_logs(conn: &Connection) -> Result<Vec<PromotionLog>> {
  query_logs(conn, "1 = 1", params![])
}

pub fn find_logs(
  conn: &Connection,
  from_period_id: i64,
  source_class_id: i64,
  to_period_id: i64,
) -> Result<Vec<PromotionLog>> {
  query_logs(
    conn,
    "l.from_period_id = ?1 AND l.source_class_id = ?2 AND l.to_period_id = ?3",
    params![from_period_id, source_class_id, to_period_id],
  )
}

fn query_logs(
  conn: &Connection,
  condition: &str,
  params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<PromotionLog>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {LOG_COLUMNS} FROM {LOG_FROM} WHERE {condition}
     ORDER BY l.created_at DESC, l.id DESC"
  ))?;
  let raws = stmt
    .query_map(params, RawLog::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawLog::into_log).collect()
}

pub fn outcomes_of(conn: &Connection, log_id: i64) -> Result<Vec<PromotionOutcome>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {OUTCOME_COLUMNS} FROM promotion_outcomes WHERE promotion_log_id = ?1 ORDER BY id"
  ))?;
  let raws = stmt
    .query_map(params![log_id], RawOutcome::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawOutcome::into_outcome).collect()
}
