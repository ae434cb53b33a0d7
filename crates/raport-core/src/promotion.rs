//! Promotion commands, the destination planner, and audit-log records.
//!
//! A promotion run moves one source class's cohort from one period into
//! another. Destination resolution is pure and lives here in [`plan`]; storage
//! backends read the roster and successor classes inside their transaction,
//! hand them to the planner, and then apply the resulting [`PromotionPlan`].

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  fmt,
  str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Outcome & mode ──────────────────────────────────────────────────────────

/// Per-student outcome of a promotion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionStatus {
  /// Promoted: moves to the destination class.
  Naik,
  /// Held back: stays in the source class.
  Tinggal,
}

impl PromotionStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Naik => "naik",
      Self::Tinggal => "tinggal",
    }
  }
}

impl FromStr for PromotionStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "naik" => Ok(Self::Naik),
      "tinggal" => Ok(Self::Tinggal),
      other => Err(Error::InvalidStatus(other.to_owned())),
    }
  }
}

impl fmt::Display for PromotionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How destinations were chosen for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionMode {
  /// Successor class of each student's current class.
  Auto,
  /// Caller-supplied `student -> class` mapping.
  Manual,
  /// Caller-supplied per-student status and destination.
  Explicit,
}

impl PromotionMode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Auto => "auto",
      Self::Manual => "manual",
      Self::Explicit => "explicit",
    }
  }
}

impl FromStr for PromotionMode {
  type Err = Error;

  /// Parses the modes a caller may request; `explicit` is implied by the
  /// per-student endpoint and is not accepted here.
  fn from_str(s: &str) -> Result<Self> {
    match s {
      "auto" => Ok(Self::Auto),
      "manual" => Ok(Self::Manual),
      other => Err(Error::InvalidMode(other.to_owned())),
    }
  }
}

// ─── Command ─────────────────────────────────────────────────────────────────

/// An explicit per-student decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentDecision {
  pub student_id:           i64,
  pub status:               PromotionStatus,
  /// Falls back to the source class's successor when absent.
  pub destination_class_id: Option<i64>,
}

/// Which students take part and where they go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
  Auto,
  Manual(BTreeMap<i64, i64>),
  Explicit(Vec<StudentDecision>),
}

impl Selection {
  pub fn mode(&self) -> PromotionMode {
    match self {
      Self::Auto => PromotionMode::Auto,
      Self::Manual(_) => PromotionMode::Manual,
      Self::Explicit(_) => PromotionMode::Explicit,
    }
  }

  /// Destination classes named by the caller; each must exist. A held-back
  /// student stays in the source class, so their destination is ignored.
  pub fn requested_destinations(&self) -> Vec<i64> {
    let mut ids: Vec<i64> = match self {
      Self::Auto => Vec::new(),
      Self::Manual(map) => map.values().copied().collect(),
      Self::Explicit(decisions) => decisions
        .iter()
        .filter(|d| d.status == PromotionStatus::Naik)
        .filter_map(|d| d.destination_class_id)
        .collect(),
    };
    ids.sort_unstable();
    ids.dedup();
    ids
  }
}

/// A fully-validated promotion request.
#[derive(Debug, Clone)]
pub struct PromotionCommand {
  pub from_period_id:  i64,
  pub to_period_id:    i64,
  pub source_class_id: i64,
  pub selection:       Selection,
  pub executed_by:     Option<i64>,
  pub note:            Option<String>,
  /// When set, a second run with the same key replays the first result.
  pub idempotency_key: Option<String>,
}

impl PromotionCommand {
  pub fn new(
    from_period_id: i64,
    to_period_id: i64,
    source_class_id: i64,
    selection: Selection,
  ) -> Self {
    Self {
      from_period_id,
      to_period_id,
      source_class_id,
      selection,
      executed_by: None,
      note: None,
      idempotency_key: None,
    }
  }

  /// Structural checks that need no storage access.
  pub fn validate(&self) -> Result<()> {
    if self.from_period_id == self.to_period_id {
      return Err(Error::SamePeriod(self.to_period_id));
    }
    if let Some(key) = &self.idempotency_key
      && key.trim().is_empty()
    {
      return Err(Error::Validation("idempotency key must not be blank".into()));
    }
    if let Selection::Explicit(decisions) = &self.selection {
      let mut seen = HashSet::with_capacity(decisions.len());
      for d in decisions {
        if !seen.insert(d.student_id) {
          return Err(Error::Validation(format!(
            "student {} is listed more than once",
            d.student_id
          )));
        }
      }
    }
    Ok(())
  }

  /// Runs sharing this key must not overlap.
  pub fn lock_key(&self) -> (i64, i64) { (self.from_period_id, self.source_class_id) }
}

// ─── Planner ─────────────────────────────────────────────────────────────────

/// A student considered by a run, with the class they sat in during the
/// source period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterEntry {
  pub student_id: i64,
  pub class_id:   i64,
}

/// A resolved per-student move; `Tinggal` moves keep `to == from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedMove {
  pub student_id:    i64,
  pub status:        PromotionStatus,
  pub from_class_id: i64,
  pub to_class_id:   i64,
}

impl PlannedMove {
  /// Free-text note for the ledger row written for this move.
  pub fn ledger_note(&self) -> String {
    match self.status {
      PromotionStatus::Naik => {
        format!("promoted from class {} to class {}", self.from_class_id, self.to_class_id)
      }
      PromotionStatus::Tinggal => format!("held back in class {}", self.from_class_id),
    }
  }
}

/// Why a student was left out of a run. Skips are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
  /// `auto` mode and the class has no successor configured.
  NoSuccessor,
  /// `manual` mode and the student is absent from the mapping.
  NotInMapping,
  /// Explicit `naik` with no destination and no successor to fall back on.
  NoDestination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedStudent {
  pub student_id: i64,
  pub reason:     SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionPlan {
  pub moves:   Vec<PlannedMove>,
  pub skipped: Vec<SkippedStudent>,
}

impl PromotionPlan {
  pub fn promoted_count(&self) -> usize {
    self.moves.iter().filter(|m| m.status == PromotionStatus::Naik).count()
  }

  pub fn held_back_count(&self) -> usize {
    self.moves.iter().filter(|m| m.status == PromotionStatus::Tinggal).count()
  }

  /// The single class every promoted student went to, if there is one.
  pub fn common_destination(&self) -> Option<i64> {
    let mut dests = self
      .moves
      .iter()
      .filter(|m| m.status == PromotionStatus::Naik)
      .map(|m| m.to_class_id);
    let first = dests.next()?;
    dests.all(|d| d == first).then_some(first)
  }
}

/// Resolve each roster student's destination.
///
/// `roster` lists the students taking part, in the order they are applied:
/// the source class's members for `auto`/`manual`, the caller's list for
/// explicit selections. `successor_of` is a single-hop `next_class_id` lookup.
pub fn plan(
  command: &PromotionCommand,
  roster: &[RosterEntry],
  successor_of: impl Fn(i64) -> Option<i64>,
) -> PromotionPlan {
  let source = command.source_class_id;
  let mut out = PromotionPlan::default();

  let decisions: HashMap<i64, &StudentDecision> = match &command.selection {
    Selection::Explicit(list) => list.iter().map(|d| (d.student_id, d)).collect(),
    _ => HashMap::new(),
  };

  for entry in roster {
    let student_id = entry.student_id;
    let from = entry.class_id;

    let resolved = match &command.selection {
      Selection::Auto => successor_of(from)
        .map(|to| (PromotionStatus::Naik, from, to))
        .ok_or(SkipReason::NoSuccessor),
      Selection::Manual(mapping) => mapping
        .get(&student_id)
        .map(|&to| (PromotionStatus::Naik, from, to))
        .ok_or(SkipReason::NotInMapping),
      Selection::Explicit(_) => match decisions.get(&student_id) {
        None => Err(SkipReason::NotInMapping),
        Some(d) => match d.status {
          PromotionStatus::Tinggal => Ok((PromotionStatus::Tinggal, source, source)),
          PromotionStatus::Naik => d
            .destination_class_id
            .or_else(|| successor_of(source))
            .map(|to| (PromotionStatus::Naik, source, to))
            .ok_or(SkipReason::NoDestination),
        },
      },
    };

    match resolved {
      Ok((status, from_class_id, to_class_id)) => out.moves.push(PlannedMove {
        student_id,
        status,
        from_class_id,
        to_class_id,
      }),
      Err(reason) => out.skipped.push(SkippedStudent { student_id, reason }),
    }
  }

  out
}

// ─── Audit records ───────────────────────────────────────────────────────────

/// One row per promotion run. Written once, never updated after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionLog {
  pub id:                    i64,
  pub from_academic_year_id: i64,
  pub from_period_id:        i64,
  pub to_academic_year_id:   i64,
  pub to_period_id:          i64,
  pub source_class_id:       i64,
  /// Set when every promoted student went to the same class.
  pub target_class_id:       Option<i64>,
  pub mode:                  PromotionMode,
  pub executed_by:           Option<i64>,
  pub note:                  Option<String>,
  pub promoted_count:        usize,
  pub held_back_count:       usize,
  pub idempotency_key:       Option<String>,
  pub created_at:            DateTime<Utc>,
}

/// The per-student outcome of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionOutcome {
  pub id:               i64,
  pub promotion_log_id: i64,
  pub student_id:       i64,
  pub status:           PromotionStatus,
  pub from_class_id:    i64,
  pub to_class_id:      i64,
  /// The ledger row written for this outcome.
  pub history_id:       i64,
  pub created_at:       DateTime<Utc>,
}

/// What a run (or its replay) returns to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionReport {
  pub log:      PromotionLog,
  pub outcomes: Vec<PromotionOutcome>,
  pub skipped:  Vec<SkippedStudent>,
  /// `true` when an earlier run with the same idempotency key was returned.
  pub replayed: bool,
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn successors(pairs: &[(i64, i64)]) -> impl Fn(i64) -> Option<i64> + '_ {
    move |class| pairs.iter().find(|(c, _)| *c == class).map(|(_, n)| *n)
  }

  fn roster(entries: &[(i64, i64)]) -> Vec<RosterEntry> {
    entries
      .iter()
      .map(|&(student_id, class_id)| RosterEntry { student_id, class_id })
      .collect()
  }

  #[test]
  fn auto_routes_through_successor() {
    let cmd = PromotionCommand::new(10, 11, 1, Selection::Auto);
    let plan = plan(&cmd, &roster(&[(7, 1), (8, 1)]), successors(&[(1, 2)]));

    assert_eq!(plan.promoted_count(), 2);
    assert!(plan.skipped.is_empty());
    assert!(plan.moves.iter().all(|m| m.from_class_id == 1 && m.to_class_id == 2));
    assert_eq!(plan.common_destination(), Some(2));
  }

  #[test]
  fn auto_skips_terminal_class() {
    let cmd = PromotionCommand::new(10, 11, 2, Selection::Auto);
    let plan = plan(&cmd, &roster(&[(7, 2)]), successors(&[(1, 2)]));

    assert!(plan.moves.is_empty());
    assert_eq!(plan.skipped, vec![SkippedStudent {
      student_id: 7,
      reason:     SkipReason::NoSuccessor,
    }]);
    assert_eq!(plan.common_destination(), None);
  }

  #[test]
  fn manual_skips_unmapped_students() {
    let mapping = BTreeMap::from([(7, 3)]);
    let cmd = PromotionCommand::new(10, 11, 1, Selection::Manual(mapping));
    let plan = plan(&cmd, &roster(&[(7, 1), (8, 1)]), successors(&[(1, 2)]));

    assert_eq!(plan.moves.len(), 1);
    assert_eq!(plan.moves[0].to_class_id, 3);
    assert_eq!(plan.skipped[0].student_id, 8);
    assert_eq!(plan.skipped[0].reason, SkipReason::NotInMapping);
  }

  #[test]
  fn explicit_mixes_naik_and_tinggal() {
    let cmd = PromotionCommand::new(
      10,
      11,
      1,
      Selection::Explicit(vec![
        StudentDecision {
          student_id:           7,
          status:               PromotionStatus::Naik,
          destination_class_id: None,
        },
        StudentDecision {
          student_id:           8,
          status:               PromotionStatus::Tinggal,
          destination_class_id: Some(5),
        },
        StudentDecision {
          student_id:           9,
          status:               PromotionStatus::Naik,
          destination_class_id: Some(4),
        },
      ]),
    );
    let plan = plan(&cmd, &roster(&[(7, 1), (8, 1), (9, 1)]), successors(&[(1, 2)]));

    assert_eq!(plan.promoted_count(), 2);
    assert_eq!(plan.held_back_count(), 1);
    let held = plan.moves.iter().find(|m| m.student_id == 8).unwrap();
    assert_eq!((held.from_class_id, held.to_class_id), (1, 1));
    assert_eq!(plan.common_destination(), None);
  }

  #[test]
  fn explicit_naik_without_any_destination_is_skipped() {
    let cmd = PromotionCommand::new(
      10,
      11,
      2,
      Selection::Explicit(vec![StudentDecision {
        student_id:           7,
        status:               PromotionStatus::Naik,
        destination_class_id: None,
      }]),
    );
    let plan = plan(&cmd, &roster(&[(7, 2)]), |_| None);
    assert_eq!(plan.skipped[0].reason, SkipReason::NoDestination);
    assert_eq!(plan.promoted_count(), 0);
  }

  #[test]
  fn held_back_destination_is_not_requested() {
    let selection = Selection::Explicit(vec![
      StudentDecision {
        student_id:           7,
        status:               PromotionStatus::Tinggal,
        destination_class_id: Some(4242),
      },
      StudentDecision {
        student_id:           8,
        status:               PromotionStatus::Naik,
        destination_class_id: Some(3),
      },
    ]);
    assert_eq!(selection.requested_destinations(), vec![3]);
  }

  #[test]
  fn validate_rejects_same_period_and_duplicates() {
    let cmd = PromotionCommand::new(10, 10, 1, Selection::Auto);
    assert!(matches!(cmd.validate(), Err(Error::SamePeriod(10))));

    let dup = StudentDecision {
      student_id:           7,
      status:               PromotionStatus::Naik,
      destination_class_id: None,
    };
    let cmd = PromotionCommand::new(10, 11, 1, Selection::Explicit(vec![dup.clone(), dup]));
    assert!(matches!(cmd.validate(), Err(Error::Validation(_))));
  }

  #[test]
  fn status_parsing_is_strict() {
    assert_eq!("naik".parse::<PromotionStatus>().unwrap(), PromotionStatus::Naik);
    assert_eq!("tinggal".parse::<PromotionStatus>().unwrap(), PromotionStatus::Tinggal);
    assert!(matches!(
      "lulus".parse::<PromotionStatus>(),
      Err(Error::InvalidStatus(s)) if s == "lulus"
    ));
    assert!("explicit".parse::<PromotionMode>().is_err());
  }
}
