//! Student-class-history ledger types.
//!
//! The ledger is append-only: every enrollment, promotion outcome and repair
//! adds a row tagged with the period it applies to. Rows are never deleted and
//! their class/period never change; only the two teacher-authored notes may be
//! edited afterwards. Report generation reads the ledger to learn which class
//! applied to a student in a past period, independent of the student's current
//! class.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::Semester;

// ─── Entries ─────────────────────────────────────────────────────────────────

/// Why a ledger row was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
  Enrolled,
  Promoted,
  HeldBack,
  Repair,
  Manual,
}

/// A persisted ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
  pub id:               i64,
  pub student_id:       i64,
  pub period_id:        i64,
  /// Owning academic year of `period_id`, joined at read time.
  pub academic_year_id: i64,
  pub semester:         Semester,
  pub class_id:         i64,
  pub kind:             EntryKind,
  pub note:             Option<String>,
  pub academic_note:    Option<String>,
  pub behavioral_note:  Option<String>,
  /// The promotion run that wrote this row, if any.
  pub promotion_log_id: Option<i64>,
  pub created_at:       DateTime<Utc>,
}

/// Input for [`RaportStore::record_assignment`](crate::store::RaportStore::record_assignment).
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
  pub student_id:      i64,
  pub period_id:       i64,
  pub class_id:        i64,
  pub kind:            EntryKind,
  pub note:            Option<String>,
  pub academic_note:   Option<String>,
  pub behavioral_note: Option<String>,
}

impl NewHistoryEntry {
  pub fn new(student_id: i64, period_id: i64, class_id: i64, kind: EntryKind) -> Self {
    Self {
      student_id,
      period_id,
      class_id,
      kind,
      note: None,
      academic_note: None,
      behavioral_note: None,
    }
  }

  pub fn with_note(mut self, note: impl Into<String>) -> Self {
    self.note = Some(note.into());
    self
  }
}

/// Partial update of the teacher-authored notes on a ledger row.
///
/// The outer `None` (field absent) leaves the stored value untouched;
/// `Some(None)` (explicit `null`) clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesUpdate {
  #[serde(
    default,
    alias = "academic_note",
    alias = "catatan_akademik",
    deserialize_with = "present"
  )]
  pub academic_note:   Option<Option<String>>,
  #[serde(
    default,
    alias = "behavioral_note",
    alias = "catatan_perilaku",
    deserialize_with = "present"
  )]
  pub behavioral_note: Option<Option<String>>,
}

impl NotesUpdate {
  pub fn is_empty(&self) -> bool {
    self.academic_note.is_none() && self.behavioral_note.is_none()
  }
}

/// Only called for fields present in the input, so `null` becomes
/// `Some(None)` instead of collapsing into "absent".
fn present<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  Option::<String>::deserialize(de).map(Some)
}

// ─── Derived views ───────────────────────────────────────────────────────────

/// The class that applied to a student during a period.
///
/// When the ledger has no row for the period, the class falls back to the
/// student's current-class pointer and `approximate` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAssignment {
  pub student_id:  i64,
  pub period_id:   i64,
  pub class_id:    Option<i64>,
  pub entry:       Option<HistoryEntry>,
  pub approximate: bool,
}

/// A roster student lacking any ledger row for an academic year.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingStudent {
  pub student_id:        i64,
  pub name:              String,
  pub enrollment_number: String,
  pub class_id:          Option<i64>,
  pub class_name:        Option<String>,
}

/// Parameters for [`RaportStore::list_missing`](crate::store::RaportStore::list_missing).
#[derive(Debug, Clone)]
pub struct MissingQuery {
  pub academic_year_id: i64,
  pub class_id:         Option<i64>,
}

/// Compares the cached current class with the one derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
  pub student_id:      i64,
  pub cached_class_id: Option<i64>,
  /// Class of the most recently written ledger row.
  pub ledger_class_id: Option<i64>,
  pub consistent:      bool,
}

impl ConsistencyReport {
  pub fn new(student_id: i64, cached: Option<i64>, ledger: Option<i64>) -> Self {
    Self {
      student_id,
      cached_class_id: cached,
      ledger_class_id: ledger,
      consistent: cached == ledger,
    }
  }
}

// ─── Backfill ────────────────────────────────────────────────────────────────

/// Note written on ledger rows created by the repair routine.
pub const BACKFILL_NOTE: &str = "backfill: class taken from current class";

#[derive(Debug, Clone)]
pub struct BackfillRequest {
  pub academic_year_id: i64,
  pub class_id:         Option<i64>,
  pub student_id:       Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
  pub academic_year_id: i64,
  /// The period the repair rows were tagged with.
  pub period_id:        i64,
  pub created_count:    usize,
  /// Missing students that could not be repaired (no current class).
  pub unrepairable:     Vec<i64>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn consistency_compares_cached_and_ledger_class() {
    assert!(ConsistencyReport::new(1, Some(2), Some(2)).consistent);
    assert!(!ConsistencyReport::new(1, Some(1), Some(2)).consistent);
    assert!(ConsistencyReport::new(1, None, None).consistent);
  }

  #[test]
  fn notes_update_accepts_snake_case() {
    let u: NotesUpdate =
      serde_json::from_str(r#"{"academic_note":"rajin","behavioralNote":"baik"}"#)
        .unwrap();
    assert_eq!(u.academic_note, Some(Some("rajin".into())));
    assert_eq!(u.behavioral_note, Some(Some("baik".into())));
    assert!(NotesUpdate::default().is_empty());
  }

  #[test]
  fn null_note_clears_and_absent_note_keeps() {
    let u: NotesUpdate = serde_json::from_str(r#"{"academicNote":null}"#).unwrap();
    assert_eq!(u.academic_note, Some(None));
    assert_eq!(u.behavioral_note, None);
    assert!(!u.is_empty());
  }
}
