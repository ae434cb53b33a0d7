//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::BTreeMap;

use raport_core::{
  ledger::{BACKFILL_NOTE, BackfillRequest, EntryKind, MissingQuery, NewHistoryEntry, NotesUpdate},
  promotion::{
    PromotionCommand, PromotionMode, PromotionStatus, Selection, SkipReason, StudentDecision,
  },
  registry::{
    ActivationStatus, AcademicYear, ClassRoom, NewAcademicYear, NewClassRoom, NewPeriod,
    NewStudent, Period, PeriodRef, Semester,
  },
  store::RaportStore,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn year(s: &SqliteStore, label: &str) -> AcademicYear {
  s.create_academic_year(NewAcademicYear {
    label:  label.into(),
    status: ActivationStatus::Inactive,
  })
  .await
  .unwrap()
}

async fn period(s: &SqliteStore, year: &AcademicYear, semester: Semester) -> Period {
  s.create_period(NewPeriod {
    academic_year_id: year.id,
    semester,
    label: None,
    status: ActivationStatus::Inactive,
  })
  .await
  .unwrap()
}

async fn class(s: &SqliteStore, name: &str, next: Option<i64>) -> ClassRoom {
  s.create_class(NewClassRoom {
    name:                name.into(),
    capacity:            Some(30),
    homeroom_teacher_id: None,
    next_class_id:       next,
  })
  .await
  .unwrap()
}

async fn enroll(s: &SqliteStore, nis: &str, class_id: Option<i64>, period_id: Option<i64>) -> i64 {
  let mut input = NewStudent::new(nis, format!("Santri {nis}"));
  input.class_id = class_id;
  input.period_id = period_id;
  s.enroll_student(input).await.unwrap().id
}

/// Two academic years, `7A -> 8A -> (terminal)`, and the period ids a
/// promotion at the end of the first year runs between.
struct Fixture {
  s:          SqliteStore,
  first_year: AcademicYear,
  from:       Period,
  to:         Period,
  class_7a:   ClassRoom,
  class_8a:   ClassRoom,
}

async fn fixture() -> Fixture {
  let s = store().await;
  let first_year = year(&s, "2024/2025").await;
  let second_year = year(&s, "2025/2026").await;
  period(&s, &first_year, Semester::First).await;
  let from = period(&s, &first_year, Semester::Second).await;
  let to = period(&s, &second_year, Semester::First).await;
  let class_8a = class(&s, "8A", None).await;
  let class_7a = class(&s, "7A", Some(class_8a.id)).await;
  Fixture { s, first_year, from, to, class_7a, class_8a }
}

fn core_error(err: &Error) -> &raport_core::Error {
  match err {
    Error::Core(e) => e,
    other => panic!("expected a domain error, got {other:?}"),
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn period_label_defaults_from_year() {
  let f = fixture().await;
  assert_eq!(f.from.label, "2024/2025 Semester 2");
  assert_eq!(f.from.academic_year_id, f.first_year.id);
}

#[tokio::test]
async fn duplicate_semester_is_rejected() {
  let f = fixture().await;
  let err = f
    .s
    .create_period(NewPeriod {
      academic_year_id: f.first_year.id,
      semester:         Semester::Second,
      label:            None,
      status:           ActivationStatus::Inactive,
    })
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), raport_core::Error::Validation(_)));
}

#[tokio::test]
async fn activating_a_period_deactivates_the_others() {
  let f = fixture().await;
  f.s.activate_period(f.from.id).await.unwrap();
  f.s.activate_period(f.to.id).await.unwrap();

  let active: Vec<_> = f
    .s
    .list_periods(None)
    .await
    .unwrap()
    .into_iter()
    .filter(|p| p.status.is_active())
    .collect();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].id, f.to.id);

  let years = f.s.list_academic_years().await.unwrap();
  let active_years: Vec<_> = years.iter().filter(|y| y.status.is_active()).collect();
  assert_eq!(active_years.len(), 1);
  assert_eq!(active_years[0].id, f.to.academic_year_id);
}

#[tokio::test]
async fn resolve_period_by_year_label_and_semester() {
  let f = fixture().await;
  let p = f
    .s
    .resolve_period(PeriodRef::Label("2024/2025".into()), Some(Semester::Second))
    .await
    .unwrap();
  assert_eq!(p.id, f.from.id);
}

#[tokio::test]
async fn resolve_period_without_semester_prefers_active() {
  let f = fixture().await;
  let latest = f
    .s
    .resolve_period(PeriodRef::AcademicYearId(f.first_year.id), None)
    .await
    .unwrap();
  assert_eq!(latest.semester, Semester::Second);

  let first = f
    .s
    .resolve_period(PeriodRef::AcademicYearId(f.first_year.id), Some(Semester::First))
    .await
    .unwrap();
  f.s.activate_period(first.id).await.unwrap();
  let active = f
    .s
    .resolve_period(PeriodRef::AcademicYearId(f.first_year.id), None)
    .await
    .unwrap();
  assert_eq!(active.id, first.id);
}

#[tokio::test]
async fn resolve_period_by_period_label() {
  let f = fixture().await;
  let p = f
    .s
    .resolve_period(PeriodRef::Label("2024/2025 Semester 2".into()), None)
    .await
    .unwrap();
  assert_eq!(p.id, f.from.id);

  let err = f
    .s
    .resolve_period(PeriodRef::Label("2024/2025 Semester 2".into()), Some(Semester::First))
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), raport_core::Error::PeriodNotFound(_)));
}

#[tokio::test]
async fn resolve_period_by_numeric_year_label() {
  let f = fixture().await;
  let numeric = year(&f.s, "2024").await;
  let p = period(&f.s, &numeric, Semester::First).await;

  let reference: PeriodRef = "2024".parse().unwrap();
  assert_eq!(reference, PeriodRef::AcademicYearId(2024));
  let resolved = f.s.resolve_period(reference, None).await.unwrap();
  assert_eq!(resolved.id, p.id);

  // A real id still wins over a label.
  let by_id = f
    .s
    .resolve_period(PeriodRef::AcademicYearId(f.first_year.id), Some(Semester::Second))
    .await
    .unwrap();
  assert_eq!(by_id.id, f.from.id);
}

#[tokio::test]
async fn resolve_period_unknown_year() {
  let f = fixture().await;
  let err = f
    .s
    .resolve_period(PeriodRef::Label("1999/2000".into()), None)
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), raport_core::Error::PeriodNotFound(_)));
}

#[tokio::test]
async fn class_cannot_succeed_itself() {
  let f = fixture().await;
  let err = f
    .s
    .set_successor_class(f.class_8a.id, Some(f.class_8a.id))
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), raport_core::Error::Validation(_)));
}

#[tokio::test]
async fn successor_lookup_is_single_hop() {
  let f = fixture().await;
  let next = f.s.get_successor_class(f.class_7a.id).await.unwrap();
  assert_eq!(next.map(|c| c.id), Some(f.class_8a.id));
  assert!(f.s.get_successor_class(f.class_8a.id).await.unwrap().is_none());

  let err = f.s.get_successor_class(9_999).await.unwrap_err();
  assert!(matches!(core_error(&err), raport_core::Error::ClassNotFound(9_999)));
}

#[tokio::test]
async fn enrollment_writes_ledger_row_and_year() {
  let f = fixture().await;
  let id = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;

  let student = f.s.get_student(id).await.unwrap().unwrap();
  assert_eq!(student.current_class_id, Some(f.class_7a.id));
  assert_eq!(student.enrollment_year_id, Some(f.first_year.id));

  let entry = f.s.find_assignment(id, f.from.id).await.unwrap().unwrap();
  assert_eq!(entry.class_id, f.class_7a.id);
  assert_eq!(entry.kind, EntryKind::Enrolled);
}

#[tokio::test]
async fn duplicate_enrollment_number_is_rejected() {
  let f = fixture().await;
  enroll(&f.s, "1001", None, None).await;
  let err = f
    .s
    .enroll_student(NewStudent::new("1001", "Lain"))
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), raport_core::Error::Validation(_)));
}

// ─── Promotion ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn auto_promotion_moves_class_and_keeps_history() {
  let f = fixture().await;
  let student = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;

  let report = f
    .s
    .promote(PromotionCommand::new(f.from.id, f.to.id, f.class_7a.id, Selection::Auto))
    .await
    .unwrap();

  assert!(!report.replayed);
  assert_eq!(report.log.mode, PromotionMode::Auto);
  assert_eq!(report.log.promoted_count, 1);
  assert_eq!(report.log.held_back_count, 0);
  assert_eq!(report.log.target_class_id, Some(f.class_8a.id));
  assert_eq!(report.log.from_academic_year_id, f.first_year.id);
  assert_eq!(report.outcomes.len(), 1);

  let s = f.s.get_student(student).await.unwrap().unwrap();
  assert_eq!(s.current_class_id, Some(f.class_8a.id));

  let after = f.s.find_assignment(student, f.to.id).await.unwrap().unwrap();
  assert_eq!(after.class_id, f.class_8a.id);
  assert_eq!(after.kind, EntryKind::Promoted);
  assert_eq!(after.promotion_log_id, Some(report.log.id));

  // The earlier period still reports the class the student was in then.
  let before = f.s.find_assignment(student, f.from.id).await.unwrap().unwrap();
  assert_eq!(before.class_id, f.class_7a.id);
}

#[tokio::test]
async fn terminal_class_students_are_skipped() {
  let f = fixture().await;
  let student = enroll(&f.s, "2001", Some(f.class_8a.id), Some(f.from.id)).await;

  let report = f
    .s
    .promote(PromotionCommand::new(f.from.id, f.to.id, f.class_8a.id, Selection::Auto))
    .await
    .unwrap();

  assert_eq!(report.log.promoted_count, 0);
  assert_eq!(report.skipped.len(), 1);
  assert_eq!(report.skipped[0].reason, SkipReason::NoSuccessor);
  assert!(f.s.find_assignment(student, f.to.id).await.unwrap().is_none());
  assert_eq!(f.s.list_promotion_logs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn repeated_run_promotes_again() {
  let f = fixture().await;
  // No ledger row in the source period; only the current class is known.
  let student = enroll(&f.s, "1001", Some(f.class_7a.id), None).await;
  let cmd = PromotionCommand::new(f.from.id, f.to.id, f.class_7a.id, Selection::Auto);

  let first = f.s.promote(cmd.clone()).await.unwrap();
  let second = f.s.promote(cmd).await.unwrap();

  assert_ne!(first.log.id, second.log.id);
  assert_eq!(first.log.promoted_count, 1);
  assert_eq!(second.log.promoted_count, 1);

  let rows: Vec<_> = f
    .s
    .student_history(student)
    .await
    .unwrap()
    .into_iter()
    .filter(|e| e.period_id == f.to.id)
    .collect();
  assert_eq!(rows.len(), 2);
  assert!(rows.iter().all(|e| e.class_id == f.class_8a.id));

  let s = f.s.get_student(student).await.unwrap().unwrap();
  assert_eq!(s.current_class_id, Some(f.class_8a.id));

  let earlier = f
    .s
    .find_promotions(f.from.id, f.class_7a.id, f.to.id)
    .await
    .unwrap();
  assert_eq!(earlier.len(), 2);
  assert_eq!(earlier[0].id, second.log.id);
}

#[tokio::test]
async fn roster_follows_the_source_period() {
  let f = fixture().await;
  // Sat in 7A during the source period but has since been moved to 8A by hand.
  let moved = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  f.s
    .record_assignment(NewHistoryEntry::new(moved, f.to.id, f.class_8a.id, EntryKind::Manual))
    .await
    .unwrap();
  // Recorded in 8A for the source period, though the pointer says 7A.
  let elsewhere = enroll(&f.s, "1002", Some(f.class_7a.id), None).await;
  f.s
    .record_assignment(NewHistoryEntry::new(
      elsewhere,
      f.from.id,
      f.class_8a.id,
      EntryKind::Manual,
    ))
    .await
    .unwrap();

  let report = f
    .s
    .promote(PromotionCommand::new(f.from.id, f.to.id, f.class_7a.id, Selection::Auto))
    .await
    .unwrap();

  let routed: Vec<i64> = report.outcomes.iter().map(|o| o.student_id).collect();
  assert_eq!(routed, vec![moved]);
}

#[tokio::test]
async fn idempotency_key_replays_first_run() {
  let f = fixture().await;
  let student = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  let mut cmd = PromotionCommand::new(f.from.id, f.to.id, f.class_7a.id, Selection::Auto);
  cmd.idempotency_key = Some("naik-7a-2025".into());

  let first = f.s.promote(cmd.clone()).await.unwrap();
  let replay = f.s.promote(cmd).await.unwrap();

  assert!(replay.replayed);
  assert_eq!(replay.log.id, first.log.id);
  assert_eq!(replay.outcomes.len(), 1);
  assert_eq!(f.s.list_promotion_logs().await.unwrap().len(), 1);
  assert_eq!(f.s.student_history(student).await.unwrap().len(), 2);
}

#[tokio::test]
async fn idempotency_key_reuse_for_another_class_is_rejected() {
  let f = fixture().await;
  enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  let stay = enroll(&f.s, "1002", Some(f.class_8a.id), Some(f.from.id)).await;

  let mut first = PromotionCommand::new(f.from.id, f.to.id, f.class_7a.id, Selection::Auto);
  first.idempotency_key = Some("k".into());
  f.s.promote(first).await.unwrap();

  let mut other = PromotionCommand::new(
    f.from.id,
    f.to.id,
    f.class_8a.id,
    Selection::Explicit(vec![StudentDecision {
      student_id:           stay,
      status:               PromotionStatus::Tinggal,
      destination_class_id: None,
    }]),
  );
  other.idempotency_key = Some("k".into());
  let err = f.s.promote(other).await.unwrap_err();
  assert!(matches!(core_error(&err), raport_core::Error::Validation(_)));

  assert_eq!(f.s.list_promotion_logs().await.unwrap().len(), 1);
  assert!(f.s.find_assignment(stay, f.to.id).await.unwrap().is_none());
}

#[tokio::test]
async fn manual_mapping_routes_listed_students_only() {
  let f = fixture().await;
  let class_8b = class(&f.s, "8B", None).await;
  let a = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  let b = enroll(&f.s, "1002", Some(f.class_7a.id), Some(f.from.id)).await;

  let report = f
    .s
    .promote(PromotionCommand::new(
      f.from.id,
      f.to.id,
      f.class_7a.id,
      Selection::Manual(BTreeMap::from([(a, class_8b.id)])),
    ))
    .await
    .unwrap();

  assert_eq!(report.log.mode, PromotionMode::Manual);
  assert_eq!(report.log.target_class_id, Some(class_8b.id));
  assert_eq!(report.skipped.len(), 1);
  assert_eq!(report.skipped[0].student_id, b);
  assert_eq!(report.skipped[0].reason, SkipReason::NotInMapping);

  let a_now = f.s.get_student(a).await.unwrap().unwrap();
  let b_now = f.s.get_student(b).await.unwrap().unwrap();
  assert_eq!(a_now.current_class_id, Some(class_8b.id));
  assert_eq!(b_now.current_class_id, Some(f.class_7a.id));
}

#[tokio::test]
async fn explicit_tinggal_keeps_class_and_records_it() {
  let f = fixture().await;
  let up = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  let stay = enroll(&f.s, "1002", Some(f.class_7a.id), Some(f.from.id)).await;

  let report = f
    .s
    .promote(PromotionCommand::new(
      f.from.id,
      f.to.id,
      f.class_7a.id,
      Selection::Explicit(vec![
        StudentDecision {
          student_id:           up,
          status:               PromotionStatus::Naik,
          destination_class_id: None,
        },
        StudentDecision {
          student_id:           stay,
          status:               PromotionStatus::Tinggal,
          destination_class_id: None,
        },
      ]),
    ))
    .await
    .unwrap();

  assert_eq!(report.log.mode, PromotionMode::Explicit);
  assert_eq!(report.log.promoted_count, 1);
  assert_eq!(report.log.held_back_count, 1);
  assert_eq!(report.log.target_class_id, None);

  let stayed = f.s.get_student(stay).await.unwrap().unwrap();
  assert_eq!(stayed.current_class_id, Some(f.class_7a.id));
  let row = f.s.find_assignment(stay, f.to.id).await.unwrap().unwrap();
  assert_eq!(row.class_id, f.class_7a.id);
  assert_eq!(row.kind, EntryKind::HeldBack);

  let moved = f.s.find_assignment(up, f.to.id).await.unwrap().unwrap();
  assert_eq!(moved.class_id, f.class_8a.id);
}

#[tokio::test]
async fn failed_run_leaves_no_trace() {
  let f = fixture().await;
  let student = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;

  let err = f
    .s
    .promote(PromotionCommand::new(
      f.from.id,
      f.to.id,
      f.class_7a.id,
      Selection::Explicit(vec![
        StudentDecision {
          student_id:           student,
          status:               PromotionStatus::Naik,
          destination_class_id: None,
        },
        StudentDecision {
          student_id:           9_999,
          status:               PromotionStatus::Naik,
          destination_class_id: None,
        },
      ]),
    ))
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), raport_core::Error::StudentNotFound(9_999)));

  assert!(f.s.list_promotion_logs().await.unwrap().is_empty());
  assert!(f.s.find_assignment(student, f.to.id).await.unwrap().is_none());
  let s = f.s.get_student(student).await.unwrap().unwrap();
  assert_eq!(s.current_class_id, Some(f.class_7a.id));
}

#[tokio::test]
async fn mid_run_failure_rolls_back_earlier_students() {
  let f = fixture().await;
  let first = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  let second = enroll(&f.s, "1002", Some(f.class_7a.id), Some(f.from.id)).await;
  f.s
    .execute_batch(format!(
      "CREATE TRIGGER reject_outcome BEFORE INSERT ON promotion_outcomes
       WHEN NEW.student_id = {second}
       BEGIN SELECT RAISE(ABORT, 'outcome rejected'); END;"
    ))
    .await
    .unwrap();

  let naik = |student_id| StudentDecision {
    student_id,
    status: PromotionStatus::Naik,
    destination_class_id: None,
  };
  let err = f
    .s
    .promote(PromotionCommand::new(
      f.from.id,
      f.to.id,
      f.class_7a.id,
      Selection::Explicit(vec![naik(first), naik(second)]),
    ))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Sqlite(_)), "unexpected error: {err:?}");

  // The first student was fully written before the failure; none of it stays.
  assert!(f.s.list_promotion_logs().await.unwrap().is_empty());
  for student in [first, second] {
    assert!(f.s.find_assignment(student, f.to.id).await.unwrap().is_none());
    let s = f.s.get_student(student).await.unwrap().unwrap();
    assert_eq!(s.current_class_id, Some(f.class_7a.id));
  }
}

#[tokio::test]
async fn held_back_destination_is_ignored() {
  let f = fixture().await;
  let stay = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;

  let report = f
    .s
    .promote(PromotionCommand::new(
      f.from.id,
      f.to.id,
      f.class_7a.id,
      Selection::Explicit(vec![StudentDecision {
        student_id:           stay,
        status:               PromotionStatus::Tinggal,
        destination_class_id: Some(4_242),
      }]),
    ))
    .await
    .unwrap();

  assert_eq!(report.log.held_back_count, 1);
  let row = f.s.find_assignment(stay, f.to.id).await.unwrap().unwrap();
  assert_eq!(row.class_id, f.class_7a.id);
}

#[tokio::test]
async fn unknown_destination_class_is_rejected() {
  let f = fixture().await;
  let student = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  let err = f
    .s
    .promote(PromotionCommand::new(
      f.from.id,
      f.to.id,
      f.class_7a.id,
      Selection::Manual(BTreeMap::from([(student, 4_242)])),
    ))
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), raport_core::Error::ClassNotFound(4_242)));
  assert!(f.s.list_promotion_logs().await.unwrap().is_empty());
}

#[tokio::test]
async fn same_period_is_rejected() {
  let f = fixture().await;
  let err = f
    .s
    .promote(PromotionCommand::new(f.from.id, f.from.id, f.class_7a.id, Selection::Auto))
    .await
    .unwrap_err();
  assert!(matches!(core_error(&err), raport_core::Error::SamePeriod(_)));
}

#[tokio::test]
async fn promotion_log_detail_lists_outcomes() {
  let f = fixture().await;
  enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  enroll(&f.s, "1002", Some(f.class_7a.id), Some(f.from.id)).await;
  let report = f
    .s
    .promote(PromotionCommand::new(f.from.id, f.to.id, f.class_7a.id, Selection::Auto))
    .await
    .unwrap();

  let detail = f.s.get_promotion_log(report.log.id).await.unwrap().unwrap();
  assert_eq!(detail.outcomes.len(), 2);
  assert!(detail.outcomes.iter().all(|o| o.to_class_id == f.class_8a.id));
  assert!(f.s.get_promotion_log(report.log.id + 1).await.unwrap().is_none());
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn resolve_assignment_falls_back_to_current_class() {
  let f = fixture().await;
  let student = enroll(&f.s, "1001", Some(f.class_7a.id), None).await;

  let resolved = f.s.resolve_assignment(student, f.from.id).await.unwrap();
  assert!(resolved.approximate);
  assert!(resolved.entry.is_none());
  assert_eq!(resolved.class_id, Some(f.class_7a.id));
}

#[tokio::test]
async fn latest_row_wins_within_a_period() {
  let f = fixture().await;
  let student = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  f.s
    .record_assignment(NewHistoryEntry::new(
      student,
      f.from.id,
      f.class_8a.id,
      EntryKind::Manual,
    ))
    .await
    .unwrap();

  let entry = f.s.find_assignment(student, f.from.id).await.unwrap().unwrap();
  assert_eq!(entry.class_id, f.class_8a.id);
  assert_eq!(f.s.student_history(student).await.unwrap().len(), 2);

  let report = f.s.check_current_class(student).await.unwrap();
  assert!(!report.consistent);
  assert_eq!(report.ledger_class_id, Some(f.class_8a.id));
}

#[tokio::test]
async fn update_notes_keeps_class_and_period() {
  let f = fixture().await;
  let student = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  let entry = f.s.find_assignment(student, f.from.id).await.unwrap().unwrap();

  let updated = f
    .s
    .update_notes(entry.id, NotesUpdate {
      academic_note:   Some(Some("hafalan lancar".into())),
      behavioral_note: Some(Some("sopan".into())),
    })
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.academic_note.as_deref(), Some("hafalan lancar"));
  assert_eq!(updated.behavioral_note.as_deref(), Some("sopan"));
  assert_eq!(updated.class_id, entry.class_id);
  assert_eq!(updated.period_id, entry.period_id);

  // Explicit null clears one note; the absent one is kept.
  let cleared = f
    .s
    .update_notes(entry.id, NotesUpdate { academic_note: Some(None), behavioral_note: None })
    .await
    .unwrap()
    .unwrap();
  assert_eq!(cleared.academic_note, None);
  assert_eq!(cleared.behavioral_note.as_deref(), Some("sopan"));

  let missing = f
    .s
    .update_notes(9_999, NotesUpdate {
      academic_note:   Some(Some("x".into())),
      behavioral_note: None,
    })
    .await
    .unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn empty_notes_update_checks_entry_first() {
  let f = fixture().await;
  let student = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  let entry = f.s.find_assignment(student, f.from.id).await.unwrap().unwrap();

  let missing = f.s.update_notes(9_999, NotesUpdate::default()).await.unwrap();
  assert!(missing.is_none());

  let err = f.s.update_notes(entry.id, NotesUpdate::default()).await.unwrap_err();
  assert!(matches!(core_error(&err), raport_core::Error::Validation(_)));
}

#[tokio::test]
async fn consistency_holds_after_promotion() {
  let f = fixture().await;
  let student = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  f.s
    .promote(PromotionCommand::new(f.from.id, f.to.id, f.class_7a.id, Selection::Auto))
    .await
    .unwrap();
  assert!(f.s.check_current_class(student).await.unwrap().consistent);
}

#[tokio::test]
async fn enrollment_year_backfill_uses_earliest_row() {
  let f = fixture().await;
  let student = enroll(&f.s, "1001", Some(f.class_7a.id), None).await;
  f.s
    .record_assignment(NewHistoryEntry::new(
      student,
      f.from.id,
      f.class_7a.id,
      EntryKind::Manual,
    ))
    .await
    .unwrap();

  assert_eq!(f.s.backfill_enrollment_years().await.unwrap(), 1);
  let s = f.s.get_student(student).await.unwrap().unwrap();
  assert_eq!(s.enrollment_year_id, Some(f.first_year.id));
  assert_eq!(f.s.backfill_enrollment_years().await.unwrap(), 0);
}

// ─── Backfill ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_students_are_backfilled_once() {
  let f = fixture().await;
  let recorded = enroll(&f.s, "1001", Some(f.class_7a.id), Some(f.from.id)).await;
  let missing = enroll(&f.s, "1002", Some(f.class_7a.id), None).await;
  let classless = enroll(&f.s, "1003", None, None).await;

  let query = MissingQuery { academic_year_id: f.first_year.id, class_id: None };
  let before: Vec<i64> = f
    .s
    .list_missing(&query)
    .await
    .unwrap()
    .into_iter()
    .map(|m| m.student_id)
    .collect();
  assert!(before.contains(&missing));
  assert!(before.contains(&classless));
  assert!(!before.contains(&recorded));

  let request = BackfillRequest {
    academic_year_id: f.first_year.id,
    class_id:         None,
    student_id:       None,
  };
  let report = f.s.backfill(request.clone()).await.unwrap();
  assert_eq!(report.created_count, 1);
  assert_eq!(report.unrepairable, vec![classless]);
  assert_eq!(report.period_id, f.from.id);

  let row = f.s.find_assignment(missing, f.from.id).await.unwrap().unwrap();
  assert_eq!(row.kind, EntryKind::Repair);
  assert_eq!(row.note.as_deref(), Some(BACKFILL_NOTE));

  let again = f.s.backfill(request).await.unwrap();
  assert_eq!(again.created_count, 0);

  let after = f.s.list_missing(&query).await.unwrap();
  assert_eq!(after.len(), 1);
  assert_eq!(after[0].student_id, classless);
}

#[tokio::test]
async fn backfill_filters_by_class() {
  let f = fixture().await;
  enroll(&f.s, "1001", Some(f.class_7a.id), None).await;
  let other = enroll(&f.s, "2001", Some(f.class_8a.id), None).await;

  let report = f
    .s
    .backfill(BackfillRequest {
      academic_year_id: f.first_year.id,
      class_id:         Some(f.class_7a.id),
      student_id:       None,
    })
    .await
    .unwrap();
  assert_eq!(report.created_count, 1);
  assert!(f.s.find_assignment(other, f.from.id).await.unwrap().is_none());
}

#[tokio::test]
async fn backfill_needs_a_period_in_the_year() {
  let f = fixture().await;
  let empty = year(&f.s, "2026/2027").await;
  let err = f
    .s
    .backfill(BackfillRequest {
      academic_year_id: empty.id,
      class_id:         None,
      student_id:       None,
    })
    .await
    .unwrap_err();
  assert!(matches!(
    core_error(&err),
    raport_core::Error::AcademicYearWithoutPeriods(id) if *id == empty.id
  ));
}
