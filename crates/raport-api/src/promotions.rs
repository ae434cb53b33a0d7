//! Handlers for `/promotions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/promotions` | Batch run by class; body: [`PromoteBody`] |
//! | `POST` | `/promotions/execute` | Explicit per-student outcomes; body: [`ExecuteBody`] |
//! | `GET`  | `/promotions/logs` | Audit log, newest first |
//! | `GET`  | `/promotions/logs/{id}` | One run with its per-student outcomes; 404 if absent |
//! | `GET`  | `/promotions/check` | `?fromPeriodId&sourceClassId&toPeriodId`; earlier runs |
//!
//! Request bodies are normalised here into a [`PromotionCommand`]; nothing
//! reaches the store until every field has been validated.

use std::{collections::BTreeMap, sync::Arc};

use axum::{
  Json,
  extract::{Path, Query, State},
};
use raport_core::{
  promotion::{
    PromotionCommand, PromotionLog, PromotionMode, PromotionOutcome, PromotionReport,
    PromotionStatus, Selection, SkippedStudent, StudentDecision,
  },
  store::RaportStore,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, required};

// ─── Responses ────────────────────────────────────────────────────────────────

/// Result of a promotion run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionResponse {
  pub success:         bool,
  pub log:             PromotionLog,
  pub promoted_count:  usize,
  pub held_back_count: usize,
  pub skipped:         Vec<SkippedStudent>,
  pub outcomes:        Vec<PromotionOutcome>,
  /// `true` when an earlier run with the same idempotency key was returned.
  pub replayed:        bool,
}

impl From<PromotionReport> for PromotionResponse {
  fn from(r: PromotionReport) -> Self {
    Self {
      success:         true,
      promoted_count:  r.log.promoted_count,
      held_back_count: r.log.held_back_count,
      log:             r.log,
      skipped:         r.skipped,
      outcomes:        r.outcomes,
      replayed:        r.replayed,
    }
  }
}

// ─── Batch run ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteBody {
  #[serde(alias = "from_period_id")]
  pub from_period_id:  Option<i64>,
  #[serde(alias = "to_period_id")]
  pub to_period_id:    Option<i64>,
  #[serde(alias = "source_class_id")]
  pub source_class_id: Option<i64>,
  pub mode:            Option<String>,
  /// `{ "<studentId>": <classId> }`, required for `manual`.
  #[serde(alias = "manual_mapping")]
  pub manual_mapping:  Option<BTreeMap<i64, i64>>,
  #[serde(alias = "executed_by")]
  pub executed_by:     Option<i64>,
  pub note:            Option<String>,
  #[serde(alias = "idempotency_key")]
  pub idempotency_key: Option<String>,
}

impl TryFrom<PromoteBody> for PromotionCommand {
  type Error = ApiError;

  fn try_from(b: PromoteBody) -> Result<Self, ApiError> {
    let from = required(b.from_period_id, "fromPeriodId")?;
    let to = required(b.to_period_id, "toPeriodId")?;
    let source = required(b.source_class_id, "sourceClassId")?;
    let mode: PromotionMode = required(b.mode, "mode")?.parse()?;

    let selection = match mode {
      PromotionMode::Manual => Selection::Manual(required(b.manual_mapping, "manualMapping")?),
      _ => Selection::Auto,
    };

    let mut command = PromotionCommand::new(from, to, source, selection);
    command.executed_by = b.executed_by;
    command.note = b.note;
    command.idempotency_key = b.idempotency_key;
    command.validate()?;
    Ok(command)
  }
}

/// `POST /promotions`
pub async fn promote<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<PromoteBody>,
) -> Result<Json<PromotionResponse>, ApiError>
where
  S: RaportStore,
{
  let command = PromotionCommand::try_from(body)?;
  let report = store.promote(command).await.map_err(ApiError::from_store)?;
  Ok(Json(report.into()))
}

// ─── Explicit run ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
  #[serde(alias = "student_id", alias = "siswaId", alias = "siswa_id")]
  pub student_id:           Option<i64>,
  pub status:               Option<String>,
  #[serde(alias = "destination_class_id")]
  pub destination_class_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
  #[serde(alias = "from_period_id")]
  pub from_period_id:  Option<i64>,
  #[serde(alias = "source_class_id")]
  pub source_class_id: Option<i64>,
  #[serde(alias = "to_period_id")]
  pub to_period_id:    Option<i64>,
  pub promotions:      Option<Vec<DecisionBody>>,
  #[serde(alias = "executed_by")]
  pub executed_by:     Option<i64>,
  pub note:            Option<String>,
  #[serde(alias = "idempotency_key")]
  pub idempotency_key: Option<String>,
}

impl TryFrom<DecisionBody> for StudentDecision {
  type Error = ApiError;

  fn try_from(d: DecisionBody) -> Result<Self, ApiError> {
    let student_id = required(d.student_id, "promotions[].studentId")?;
    let status: PromotionStatus = required(d.status, "promotions[].status")?.parse()?;
    Ok(StudentDecision {
      student_id,
      status,
      destination_class_id: d.destination_class_id,
    })
  }
}

impl TryFrom<ExecuteBody> for PromotionCommand {
  type Error = ApiError;

  fn try_from(b: ExecuteBody) -> Result<Self, ApiError> {
    let from = required(b.from_period_id, "fromPeriodId")?;
    let source = required(b.source_class_id, "sourceClassId")?;
    let to = required(b.to_period_id, "toPeriodId")?;
    let entries = required(b.promotions, "promotions")?;
    if entries.is_empty() {
      return Err(ApiError::BadRequest("promotions must not be empty".into()));
    }
    let decisions = entries
      .into_iter()
      .map(StudentDecision::try_from)
      .collect::<Result<Vec<_>, _>>()?;

    let mut command = PromotionCommand::new(from, to, source, Selection::Explicit(decisions));
    command.executed_by = b.executed_by;
    command.note = b.note;
    command.idempotency_key = b.idempotency_key;
    command.validate()?;
    Ok(command)
  }
}

/// `POST /promotions/execute`
pub async fn execute<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<ExecuteBody>,
) -> Result<Json<PromotionResponse>, ApiError>
where
  S: RaportStore,
{
  let command = PromotionCommand::try_from(body)?;
  let report = store.promote(command).await.map_err(ApiError::from_store)?;
  Ok(Json(report.into()))
}

// ─── Audit log ────────────────────────────────────────────────────────────────

/// `GET /promotions/logs`
pub async fn list_logs<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<PromotionLog>>, ApiError>
where
  S: RaportStore,
{
  let logs = store.list_promotion_logs().await.map_err(ApiError::from_store)?;
  Ok(Json(logs))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDetail {
  pub log:      PromotionLog,
  pub outcomes: Vec<PromotionOutcome>,
}

/// `GET /promotions/logs/{id}`
pub async fn get_log<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<Json<LogDetail>, ApiError>
where
  S: RaportStore,
{
  let report = store
    .get_promotion_log(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("promotion log {id} not found")))?;
  Ok(Json(LogDetail { log: report.log, outcomes: report.outcomes }))
}

// ─── Pre-check ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckParams {
  #[serde(alias = "from_period_id")]
  pub from_period_id:  Option<i64>,
  #[serde(alias = "source_class_id")]
  pub source_class_id: Option<i64>,
  #[serde(alias = "to_period_id")]
  pub to_period_id:    Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
  pub already_promoted: bool,
  pub runs:             Vec<PromotionLog>,
}

/// `GET /promotions/check?fromPeriodId&sourceClassId&toPeriodId`
pub async fn check<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<CheckParams>,
) -> Result<Json<CheckResponse>, ApiError>
where
  S: RaportStore,
{
  let from = required(params.from_period_id, "fromPeriodId")?;
  let source = required(params.source_class_id, "sourceClassId")?;
  let to = required(params.to_period_id, "toPeriodId")?;
  let runs = store
    .find_promotions(from, source, to)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(CheckResponse { already_promoted: !runs.is_empty(), runs }))
}
