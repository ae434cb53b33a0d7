//! [`SqliteStore`], the SQLite implementation of [`RaportStore`].

use std::{path::Path, sync::Arc};

use chrono::Utc;
use rusqlite::Connection;

use raport_core::{
  ledger::{
    BackfillReport, BackfillRequest, ConsistencyReport, HistoryEntry, MissingQuery,
    MissingStudent, NewHistoryEntry, NotesUpdate, ResolvedAssignment,
  },
  promotion::{PromotionCommand, PromotionLog, PromotionReport},
  registry::{
    AcademicYear, ClassRoom, NewAcademicYear, NewClassRoom, NewPeriod, NewStudent, Period,
    PeriodRef, Semester, Student,
  },
  store::RaportStore,
};

use crate::{Error, Result, backfill, ledger, lock::PromotionLocks, promotion, registry, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A raport store backed by a single SQLite file.
///
/// Cloning is cheap; the connection and the promotion locks are shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  locks: Arc<PromotionLocks>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::with_connection(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::with_connection(conn).await
  }

  async fn with_connection(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let store = Self { conn, locks: Arc::default() };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the database thread.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` inside a transaction that commits only if `f` succeeds.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(in_transaction(conn, f))).await?
  }
}

#[cfg(test)]
impl SqliteStore {
  /// Raw SQL for tests that need to rig the database.
  pub(crate) async fn execute_batch(&self, sql: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Dropping the transaction without committing rolls it back.
fn in_transaction<T>(
  conn: &mut Connection,
  f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
  let tx = conn.transaction()?;
  let out = f(&tx)?;
  tx.commit()?;
  Ok(out)
}

// ─── RaportStore impl ────────────────────────────────────────────────────────

impl RaportStore for SqliteStore {
  type Error = Error;

  // ── Registry ──────────────────────────────────────────────────────────────

  async fn create_academic_year(&self, input: NewAcademicYear) -> Result<AcademicYear> {
    let now = Utc::now();
    let year = self
      .write(move |conn| registry::insert_academic_year(conn, &input, now))
      .await?;
    tracing::info!(academic_year_id = year.id, label = %year.label, "academic year created");
    Ok(year)
  }

  async fn list_academic_years(&self) -> Result<Vec<AcademicYear>> {
    self.read(registry::list_academic_years).await
  }

  async fn create_period(&self, input: NewPeriod) -> Result<Period> {
    let now = Utc::now();
    let period = self.write(move |conn| registry::insert_period(conn, &input, now)).await?;
    tracing::info!(period_id = period.id, label = %period.label, "period created");
    Ok(period)
  }

  async fn activate_period(&self, id: i64) -> Result<Period> {
    let period = self.write(move |conn| registry::activate_period(conn, id)).await?;
    tracing::info!(period_id = period.id, label = %period.label, "period activated");
    Ok(period)
  }

  async fn get_period(&self, id: i64) -> Result<Option<Period>> {
    self.read(move |conn| registry::get_period(conn, id)).await
  }

  async fn list_periods(&self, academic_year_id: Option<i64>) -> Result<Vec<Period>> {
    self.read(move |conn| registry::list_periods(conn, academic_year_id)).await
  }

  async fn resolve_period(
    &self,
    reference: PeriodRef,
    semester: Option<Semester>,
  ) -> Result<Period> {
    self
      .read(move |conn| registry::resolve_period(conn, &reference, semester))
      .await
  }

  async fn create_class(&self, input: NewClassRoom) -> Result<ClassRoom> {
    let now = Utc::now();
    let class = self.write(move |conn| registry::insert_class(conn, &input, now)).await?;
    tracing::info!(class_id = class.id, name = %class.name, "class created");
    Ok(class)
  }

  async fn get_class(&self, id: i64) -> Result<Option<ClassRoom>> {
    self.read(move |conn| registry::get_class(conn, id)).await
  }

  async fn list_classes(&self) -> Result<Vec<ClassRoom>> {
    self.read(registry::list_classes).await
  }

  async fn set_successor_class(
    &self,
    class_id: i64,
    next_class_id: Option<i64>,
  ) -> Result<ClassRoom> {
    let class = self
      .write(move |conn| registry::set_successor(conn, class_id, next_class_id))
      .await?;
    tracing::info!(class_id, next_class_id = ?class.next_class_id, "class successor set");
    Ok(class)
  }

  async fn get_successor_class(&self, class_id: i64) -> Result<Option<ClassRoom>> {
    self.read(move |conn| registry::successor_of(conn, class_id)).await
  }

  async fn enroll_student(&self, input: NewStudent) -> Result<Student> {
    let now = Utc::now();
    let student = self.write(move |conn| registry::insert_student(conn, &input, now)).await?;
    tracing::info!(
      student_id = student.id,
      class_id = ?student.current_class_id,
      "student enrolled"
    );
    Ok(student)
  }

  async fn get_student(&self, id: i64) -> Result<Option<Student>> {
    self.read(move |conn| registry::get_student(conn, id)).await
  }

  async fn list_students(&self, class_id: Option<i64>) -> Result<Vec<Student>> {
    self.read(move |conn| registry::list_students(conn, class_id)).await
  }

  // ── Ledger ────────────────────────────────────────────────────────────────

  async fn record_assignment(&self, input: NewHistoryEntry) -> Result<HistoryEntry> {
    let now = Utc::now();
    let entry = self
      .write(move |conn| {
        registry::require_student(conn, input.student_id)?;
        registry::require_period(conn, input.period_id)?;
        registry::require_class(conn, input.class_id)?;
        ledger::insert_entry(conn, &input, None, now)
      })
      .await?;
    tracing::debug!(
      history_id = entry.id,
      student_id = entry.student_id,
      period_id = entry.period_id,
      class_id = entry.class_id,
      "ledger row appended"
    );
    Ok(entry)
  }

  async fn find_assignment(
    &self,
    student_id: i64,
    period_id: i64,
  ) -> Result<Option<HistoryEntry>> {
    self
      .read(move |conn| ledger::find_assignment(conn, student_id, period_id))
      .await
  }

  async fn resolve_assignment(
    &self,
    student_id: i64,
    period_id: i64,
  ) -> Result<ResolvedAssignment> {
    self
      .read(move |conn| {
        let student = registry::require_student(conn, student_id)?;
        registry::require_period(conn, period_id)?;
        let resolved = match ledger::find_assignment(conn, student_id, period_id)? {
          Some(entry) => ResolvedAssignment {
            student_id,
            period_id,
            class_id: Some(entry.class_id),
            entry: Some(entry),
            approximate: false,
          },
          None => ResolvedAssignment {
            student_id,
            period_id,
            class_id: student.current_class_id,
            entry: None,
            approximate: true,
          },
        };
        Ok(resolved)
      })
      .await
  }

  async fn find_earliest(&self, student_id: i64) -> Result<Option<HistoryEntry>> {
    self.read(move |conn| ledger::find_earliest(conn, student_id)).await
  }

  async fn student_history(&self, student_id: i64) -> Result<Vec<HistoryEntry>> {
    self
      .read(move |conn| {
        registry::require_student(conn, student_id)?;
        ledger::student_history(conn, student_id)
      })
      .await
  }

  async fn list_missing<'a>(&'a self, query: &'a MissingQuery) -> Result<Vec<MissingStudent>> {
    let MissingQuery { academic_year_id, class_id } = *query;
    self
      .read(move |conn| {
        registry::require_academic_year(conn, academic_year_id)?;
        ledger::list_missing(conn, academic_year_id, class_id, None)
      })
      .await
  }

  async fn update_notes(
    &self,
    history_id: i64,
    update: NotesUpdate,
  ) -> Result<Option<HistoryEntry>> {
    let entry = self
      .write(move |conn| ledger::update_notes(conn, history_id, &update))
      .await?;
    if entry.is_some() {
      tracing::info!(history_id, "ledger notes updated");
    }
    Ok(entry)
  }

  async fn check_current_class(&self, student_id: i64) -> Result<ConsistencyReport> {
    let report = self
      .read(move |conn| {
        let student = registry::require_student(conn, student_id)?;
        let latest = ledger::find_latest(conn, student_id)?;
        Ok(ConsistencyReport::new(
          student_id,
          student.current_class_id,
          latest.map(|e| e.class_id),
        ))
      })
      .await?;
    if !report.consistent {
      tracing::warn!(
        student_id,
        cached = ?report.cached_class_id,
        ledger = ?report.ledger_class_id,
        "current class disagrees with ledger"
      );
    }
    Ok(report)
  }

  async fn backfill_enrollment_years(&self) -> Result<usize> {
    let updated = self.write(ledger::backfill_enrollment_years).await?;
    tracing::info!(updated, "enrollment years backfilled");
    Ok(updated)
  }

  // ── Promotion ─────────────────────────────────────────────────────────────

  async fn promote(&self, command: PromotionCommand) -> Result<PromotionReport> {
    command.validate()?;
    let _guard = self.locks.acquire(command.lock_key()).await;
    let now = Utc::now();
    self.write(move |conn| promotion::run(conn, &command, now)).await
  }

  async fn find_promotions(
    &self,
    from_period_id: i64,
    source_class_id: i64,
    to_period_id: i64,
  ) -> Result<Vec<PromotionLog>> {
    self
      .read(move |conn| promotion::find_logs(conn, from_period_id, source_class_id, to_period_id))
      .await
  }

  // ── Audit log ─────────────────────────────────────────────────────────────

  async fn list_promotion_logs(&self) -> Result<Vec<PromotionLog>> {
    self.read(promotion::list_logs).await
  }

  async fn get_promotion_log(&self, id: i64) -> Result<Option<PromotionReport>> {
    self
      .read(move |conn| {
        let Some(log) = promotion::get_log(conn, id)? else {
          return Ok(None);
        };
        let outcomes = promotion::outcomes_of(conn, id)?;
        Ok(Some(PromotionReport { log, outcomes, skipped: vec![], replayed: false }))
      })
      .await
  }

  // ── Repair ────────────────────────────────────────────────────────────────

  async fn backfill(&self, request: BackfillRequest) -> Result<BackfillReport> {
    let now = Utc::now();
    self.write(move |conn| backfill::run(conn, &request, now)).await
  }
}
