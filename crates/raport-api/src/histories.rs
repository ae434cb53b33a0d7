//! Handlers for `/histories` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/histories/backfill` | Body: `{academicYearId, classId?, studentId?}` |
//! | `GET`  | `/histories/missing` | `?academicYearId` or `?periodId`, optional `classId` |
//! | `PUT`  | `/histories/{id}/notes` | Body: `{academicNote?, behavioralNote?}`, `null` clears; 404 if absent |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use raport_core::{
  ledger::{BackfillRequest, HistoryEntry, MissingQuery, MissingStudent, NotesUpdate},
  store::RaportStore,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, required};

// ─── Backfill ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillBody {
  #[serde(
    alias = "academic_year_id",
    alias = "tahunAjaranId",
    alias = "tahun_ajaran_id"
  )]
  pub academic_year_id: Option<i64>,
  #[serde(alias = "class_id", alias = "kelasId", alias = "kelas_id")]
  pub class_id:         Option<i64>,
  #[serde(alias = "student_id", alias = "siswaId", alias = "siswa_id")]
  pub student_id:       Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillResponse {
  pub success:       bool,
  pub created_count: usize,
  pub period_id:     i64,
  pub unrepairable:  Vec<i64>,
}

/// `POST /histories/backfill`
pub async fn backfill<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<BackfillBody>,
) -> Result<Json<BackfillResponse>, ApiError>
where
  S: RaportStore,
{
  let request = BackfillRequest {
    academic_year_id: required(body.academic_year_id, "academicYearId")?,
    class_id:         body.class_id,
    student_id:       body.student_id,
  };
  let report = store.backfill(request).await.map_err(ApiError::from_store)?;
  Ok(Json(BackfillResponse {
    success:       true,
    created_count: report.created_count,
    period_id:     report.period_id,
    unrepairable:  report.unrepairable,
  }))
}

// ─── Missing report ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingParams {
  #[serde(
    alias = "academic_year_id",
    alias = "tahunAjaranId",
    alias = "tahun_ajaran_id"
  )]
  pub academic_year_id: Option<i64>,
  #[serde(alias = "period_id")]
  pub period_id:        Option<i64>,
  #[serde(alias = "class_id", alias = "kelasId", alias = "kelas_id")]
  pub class_id:         Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MissingResponse {
  pub count:   usize,
  pub missing: Vec<MissingStudent>,
}

/// `GET /histories/missing?academicYearId=<id>|periodId=<id>[&classId=<id>]`
pub async fn missing<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<MissingParams>,
) -> Result<Json<MissingResponse>, ApiError>
where
  S: RaportStore,
{
  let academic_year_id = match (params.academic_year_id, params.period_id) {
    (Some(id), _) => id,
    (None, Some(period_id)) => {
      store
        .get_period(period_id)
        .await
        .map_err(ApiError::from_store)?
        .ok_or_else(|| ApiError::NotFound(format!("period {period_id} not found")))?
        .academic_year_id
    }
    (None, None) => return Err(ApiError::missing("academicYearId or periodId")),
  };

  let query = MissingQuery { academic_year_id, class_id: params.class_id };
  let missing = store.list_missing(&query).await.map_err(ApiError::from_store)?;
  Ok(Json(MissingResponse { count: missing.len(), missing }))
}

// ─── Notes ────────────────────────────────────────────────────────────────────

/// `PUT /histories/{id}/notes`
pub async fn update_notes<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
  Json(update): Json<NotesUpdate>,
) -> Result<Json<HistoryEntry>, ApiError>
where
  S: RaportStore,
{
  let entry = store
    .update_notes(id, update)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("history entry {id} not found")))?;
  Ok(Json(entry))
}
