//! The `RaportStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `raport-store-sqlite`).
//! Higher layers (`raport-api`, `raport-server`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use crate::{
  Error,
  ledger::{
    BackfillReport, BackfillRequest, ConsistencyReport, HistoryEntry, MissingQuery,
    MissingStudent, NewHistoryEntry, NotesUpdate, ResolvedAssignment,
  },
  promotion::{PromotionCommand, PromotionLog, PromotionReport},
  registry::{
    AcademicYear, ClassRoom, NewAcademicYear, NewClassRoom, NewPeriod, NewStudent, Period,
    PeriodRef, Semester, Student,
  },
};

// ─── Error bridge ────────────────────────────────────────────────────────────

/// Backend errors expose the domain error they carry, if any, so outer layers
/// can tell validation and not-found failures apart from internal ones.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn as_core(&self) -> Option<&Error>;
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a raport store backend.
///
/// The ledger and the promotion audit log are append-only. A promotion run is
/// atomic: either every ledger row, pointer update and audit row of the run is
/// persisted, or none is.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait RaportStore: Send + Sync {
  type Error: StoreError;

  // ── Registry ──────────────────────────────────────────────────────────

  fn create_academic_year(
    &self,
    input: NewAcademicYear,
  ) -> impl Future<Output = Result<AcademicYear, Self::Error>> + Send + '_;

  fn list_academic_years(
    &self,
  ) -> impl Future<Output = Result<Vec<AcademicYear>, Self::Error>> + Send + '_;

  /// Create a period. `(academic_year_id, semester)` must be unique. An
  /// `Active` period is activated as by [`RaportStore::activate_period`].
  fn create_period(
    &self,
    input: NewPeriod,
  ) -> impl Future<Output = Result<Period, Self::Error>> + Send + '_;

  /// Make `id` the single active period (and its year the active year).
  fn activate_period(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Period, Self::Error>> + Send + '_;

  fn get_period(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Period>, Self::Error>> + Send + '_;

  fn list_periods(
    &self,
    academic_year_id: Option<i64>,
  ) -> impl Future<Output = Result<Vec<Period>, Self::Error>> + Send + '_;

  /// Resolve a period from an academic-year id or label plus a semester.
  ///
  /// The label may name the academic year or the period itself. Without a
  /// semester the year's active period is chosen, else its latest semester.
  fn resolve_period(
    &self,
    reference: PeriodRef,
    semester: Option<Semester>,
  ) -> impl Future<Output = Result<Period, Self::Error>> + Send + '_;

  fn create_class(
    &self,
    input: NewClassRoom,
  ) -> impl Future<Output = Result<ClassRoom, Self::Error>> + Send + '_;

  fn get_class(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<ClassRoom>, Self::Error>> + Send + '_;

  fn list_classes(
    &self,
  ) -> impl Future<Output = Result<Vec<ClassRoom>, Self::Error>> + Send + '_;

  fn set_successor_class(
    &self,
    class_id: i64,
    next_class_id: Option<i64>,
  ) -> impl Future<Output = Result<ClassRoom, Self::Error>> + Send + '_;

  /// Single-hop `next_class_id` lookup. `Ok(None)` for terminal classes; an
  /// error only when `class_id` itself does not exist.
  fn get_successor_class(
    &self,
    class_id: i64,
  ) -> impl Future<Output = Result<Option<ClassRoom>, Self::Error>> + Send + '_;

  fn enroll_student(
    &self,
    input: NewStudent,
  ) -> impl Future<Output = Result<Student, Self::Error>> + Send + '_;

  fn get_student(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  fn list_students(
    &self,
    class_id: Option<i64>,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + '_;

  // ── Ledger ────────────────────────────────────────────────────────────

  /// Append a ledger row. Never updates an existing one.
  fn record_assignment(
    &self,
    input: NewHistoryEntry,
  ) -> impl Future<Output = Result<HistoryEntry, Self::Error>> + Send + '_;

  /// The latest ledger row for `(student, period)`, if any.
  fn find_assignment(
    &self,
    student_id: i64,
    period_id: i64,
  ) -> impl Future<Output = Result<Option<HistoryEntry>, Self::Error>> + Send + '_;

  /// [`RaportStore::find_assignment`] with a fallback to the student's current
  /// class, flagged as approximate.
  fn resolve_assignment(
    &self,
    student_id: i64,
    period_id: i64,
  ) -> impl Future<Output = Result<ResolvedAssignment, Self::Error>> + Send + '_;

  /// The student's first ledger row by creation time.
  fn find_earliest(
    &self,
    student_id: i64,
  ) -> impl Future<Output = Result<Option<HistoryEntry>, Self::Error>> + Send + '_;

  /// All ledger rows for a student, oldest first.
  fn student_history(
    &self,
    student_id: i64,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + '_;

  /// Roster students (optionally of one class) with no ledger row in any
  /// period of the academic year.
  fn list_missing<'a>(
    &'a self,
    query: &'a MissingQuery,
  ) -> impl Future<Output = Result<Vec<MissingStudent>, Self::Error>> + Send + 'a;

  /// Edit the teacher notes of a ledger row. Returns `None` if absent, even
  /// for an empty update.
  fn update_notes(
    &self,
    history_id: i64,
    update: NotesUpdate,
  ) -> impl Future<Output = Result<Option<HistoryEntry>, Self::Error>> + Send + '_;

  fn check_current_class(
    &self,
    student_id: i64,
  ) -> impl Future<Output = Result<ConsistencyReport, Self::Error>> + Send + '_;

  /// Fill each student's missing enrollment year from their earliest ledger
  /// row. Returns the number of students updated.
  fn backfill_enrollment_years(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Promotion ─────────────────────────────────────────────────────────

  /// Execute one promotion run atomically.
  fn promote(
    &self,
    command: PromotionCommand,
  ) -> impl Future<Output = Result<PromotionReport, Self::Error>> + Send + '_;

  /// Earlier runs for the same `(from period, source class, to period)`.
  fn find_promotions(
    &self,
    from_period_id: i64,
    source_class_id: i64,
    to_period_id: i64,
  ) -> impl Future<Output = Result<Vec<PromotionLog>, Self::Error>> + Send + '_;

  // ── Audit log ─────────────────────────────────────────────────────────

  /// All runs, newest first.
  fn list_promotion_logs(
    &self,
  ) -> impl Future<Output = Result<Vec<PromotionLog>, Self::Error>> + Send + '_;

  /// One run with its per-student outcomes.
  fn get_promotion_log(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<PromotionReport>, Self::Error>> + Send + '_;

  // ── Repair ────────────────────────────────────────────────────────────

  /// Create repair rows for matching students lacking a ledger row in the
  /// academic year. Safe to repeat: a second identical call creates nothing.
  fn backfill(
    &self,
    request: BackfillRequest,
  ) -> impl Future<Output = Result<BackfillReport, Self::Error>> + Send + '_;
}
