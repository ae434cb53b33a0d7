//! Handlers for `/academic-years` and `/periods` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/academic-years` | |
//! | `POST` | `/academic-years` | Body: `{"label":"2024/2025","status":"active"?}` |
//! | `GET`  | `/periods` | Optional `?academicYearId` |
//! | `POST` | `/periods` | Body: `{academicYearId, semester, label?, status?}` |
//! | `GET`  | `/periods/resolve` | `?academicYear=<id or label>[&semester=1\|2]` |
//! | `GET`  | `/periods/{id}` | 404 if not found |
//! | `POST` | `/periods/{id}/activate` | Makes it the single active period |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use raport_core::{
  registry::{AcademicYear, ActivationStatus, NewAcademicYear, NewPeriod, Period, PeriodRef, Semester},
  store::RaportStore,
};
use serde::Deserialize;

use crate::error::{ApiError, required};

// ─── Academic years ───────────────────────────────────────────────────────────

/// `GET /academic-years`
pub async fn list_years<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<AcademicYear>>, ApiError>
where
  S: RaportStore,
{
  let years = store.list_academic_years().await.map_err(ApiError::from_store)?;
  Ok(Json(years))
}

#[derive(Debug, Deserialize)]
pub struct CreateYearBody {
  #[serde(alias = "tahunAjaran", alias = "tahun_ajaran")]
  pub label:  Option<String>,
  #[serde(default)]
  pub status: ActivationStatus,
}

/// `POST /academic-years`
pub async fn create_year<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<CreateYearBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RaportStore,
{
  let input = NewAcademicYear {
    label:  required(body.label, "label")?,
    status: body.status,
  };
  let year = store.create_academic_year(input).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(year)))
}

// ─── Periods ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPeriodsParams {
  #[serde(
    alias = "academic_year_id",
    alias = "tahunAjaranId",
    alias = "tahun_ajaran_id"
  )]
  pub academic_year_id: Option<i64>,
}

/// `GET /periods[?academicYearId=<id>]`
pub async fn list_periods<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListPeriodsParams>,
) -> Result<Json<Vec<Period>>, ApiError>
where
  S: RaportStore,
{
  let periods = store
    .list_periods(params.academic_year_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(periods))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePeriodBody {
  #[serde(
    alias = "academic_year_id",
    alias = "tahunAjaranId",
    alias = "tahun_ajaran_id"
  )]
  pub academic_year_id: Option<i64>,
  pub semester:         Option<i64>,
  pub label:            Option<String>,
  #[serde(default)]
  pub status:           ActivationStatus,
}

/// `POST /periods`
pub async fn create_period<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<CreatePeriodBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RaportStore,
{
  let input = NewPeriod {
    academic_year_id: required(body.academic_year_id, "academicYearId")?,
    semester:         Semester::try_from(required(body.semester, "semester")?)?,
    label:            body.label,
    status:           body.status,
  };
  let period = store.create_period(input).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(period)))
}

/// `GET /periods/{id}`
pub async fn get_period<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Period>, ApiError>
where
  S: RaportStore,
{
  let period = store
    .get_period(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("period {id} not found")))?;
  Ok(Json(period))
}

/// `POST /periods/{id}/activate`
pub async fn activate_period<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Period>, ApiError>
where
  S: RaportStore,
{
  let period = store.activate_period(id).await.map_err(ApiError::from_store)?;
  Ok(Json(period))
}

// ─── Resolve ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveParams {
  /// An academic-year id, an academic-year label, or a period label.
  #[serde(
    alias = "academic_year",
    alias = "academicYearId",
    alias = "academic_year_id",
    alias = "tahunAjaran",
    alias = "tahun_ajaran",
    alias = "tahunAjaranId",
    alias = "tahun_ajaran_id"
  )]
  pub academic_year: Option<String>,
  pub semester:      Option<i64>,
}

/// `GET /periods/resolve?academicYear=<id or label>[&semester=<1|2>]`
pub async fn resolve<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ResolveParams>,
) -> Result<Json<Period>, ApiError>
where
  S: RaportStore,
{
  let reference: PeriodRef = required(params.academic_year, "academicYear")?.parse()?;
  let semester = params.semester.map(Semester::try_from).transpose()?;
  let period = store
    .resolve_period(reference, semester)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(period))
}
