//! Error types for `raport-core`.

use thiserror::Error;

/// Coarse classification used by outer layers to pick a response status.
///
/// Backend errors that do not originate here (I/O, SQL) are `Internal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
  Validation,
  NotFound,
  Internal,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("invalid promotion status {0:?}, expected \"naik\" or \"tinggal\"")]
  InvalidStatus(String),

  #[error("invalid promotion mode {0:?}, expected \"auto\" or \"manual\"")]
  InvalidMode(String),

  #[error("invalid semester {0}, expected 1 or 2")]
  InvalidSemester(i64),

  #[error("source and target period are the same ({0})")]
  SamePeriod(i64),

  #[error("academic year {0} has no periods")]
  AcademicYearWithoutPeriods(i64),

  #[error("academic year not found: {0}")]
  AcademicYearNotFound(String),

  #[error("period not found: {0}")]
  PeriodNotFound(String),

  #[error("class not found: {0}")]
  ClassNotFound(i64),

  #[error("student not found: {0}")]
  StudentNotFound(i64),

  #[error("history entry not found: {0}")]
  HistoryNotFound(i64),

  #[error("promotion log not found: {0}")]
  PromotionLogNotFound(i64),
}

impl Error {
  pub fn category(&self) -> ErrorCategory {
    match self {
      Self::Validation(_)
      | Self::InvalidStatus(_)
      | Self::InvalidMode(_)
      | Self::InvalidSemester(_)
      | Self::SamePeriod(_)
      | Self::AcademicYearWithoutPeriods(_) => ErrorCategory::Validation,
      Self::AcademicYearNotFound(_)
      | Self::PeriodNotFound(_)
      | Self::ClassNotFound(_)
      | Self::StudentNotFound(_)
      | Self::HistoryNotFound(_)
      | Self::PromotionLogNotFound(_) => ErrorCategory::NotFound,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
