//! Handlers for `/students` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/students` | Optional `?classId` |
//! | `POST` | `/students` | Body: [`EnrollBody`]; 201 + the student |
//! | `GET`  | `/students/{id}` | 404 if not found |
//! | `GET`  | `/students/{id}/histories` | Ledger rows, oldest first |
//! | `GET`  | `/students/{id}/assignment` | `?periodId`; falls back to the current class |
//! | `GET`  | `/students/{id}/consistency` | Cached vs ledger-derived class |
//! | `POST` | `/students/enrollment-years/backfill` | Fills missing enrollment years |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::NaiveDate;
use raport_core::{
  ledger::{ConsistencyReport, HistoryEntry, ResolvedAssignment},
  registry::{NewStudent, Student},
  store::RaportStore,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, required};

// ─── List / get ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
  #[serde(alias = "class_id", alias = "kelasId", alias = "kelas_id")]
  pub class_id: Option<i64>,
}

/// `GET /students[?classId=<id>]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Student>>, ApiError>
where
  S: RaportStore,
{
  let students = store
    .list_students(params.class_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(students))
}

/// `GET /students/{id}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Student>, ApiError>
where
  S: RaportStore,
{
  let student = store
    .get_student(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("student {id} not found")))?;
  Ok(Json(student))
}

// ─── Enroll ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollBody {
  #[serde(alias = "enrollment_number", alias = "nis")]
  pub enrollment_number: Option<String>,
  #[serde(alias = "nama")]
  pub name:              Option<String>,
  #[serde(alias = "jenis_kelamin", alias = "jenisKelamin")]
  pub gender:            Option<String>,
  #[serde(alias = "birth_date", alias = "tanggal_lahir", alias = "tanggalLahir")]
  pub birth_date:        Option<NaiveDate>,
  #[serde(alias = "class_id", alias = "kelasId", alias = "kelas_id")]
  pub class_id:          Option<i64>,
  #[serde(alias = "room_id", alias = "kamarId", alias = "kamar_id")]
  pub room_id:           Option<i64>,
  /// Period of the initial `enrolled` ledger row.
  #[serde(alias = "period_id")]
  pub period_id:         Option<i64>,
}

impl TryFrom<EnrollBody> for NewStudent {
  type Error = ApiError;

  fn try_from(b: EnrollBody) -> Result<Self, ApiError> {
    let mut input = NewStudent::new(
      required(b.enrollment_number, "enrollmentNumber")?,
      required(b.name, "name")?,
    );
    input.gender = b.gender;
    input.birth_date = b.birth_date;
    input.class_id = b.class_id;
    input.room_id = b.room_id;
    input.period_id = b.period_id;
    input.validate()?;
    Ok(input)
  }
}

/// `POST /students`
pub async fn enroll<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<EnrollBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RaportStore,
{
  let input = NewStudent::try_from(body)?;
  let student = store.enroll_student(input).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(student)))
}

// ─── History views ────────────────────────────────────────────────────────────

/// `GET /students/{id}/histories`
pub async fn histories<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError>
where
  S: RaportStore,
{
  let entries = store.student_history(id).await.map_err(ApiError::from_store)?;
  Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentParams {
  #[serde(alias = "period_id")]
  pub period_id: Option<i64>,
}

/// `GET /students/{id}/assignment?periodId=<id>`
pub async fn assignment<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
  Query(params): Query<AssignmentParams>,
) -> Result<Json<ResolvedAssignment>, ApiError>
where
  S: RaportStore,
{
  let period_id = required(params.period_id, "periodId")?;
  let resolved = store
    .resolve_assignment(id, period_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(resolved))
}

/// `GET /students/{id}/consistency`
pub async fn consistency<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<Json<ConsistencyReport>, ApiError>
where
  S: RaportStore,
{
  let report = store.check_current_class(id).await.map_err(ApiError::from_store)?;
  Ok(Json(report))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentYearsResponse {
  pub success:       bool,
  pub updated_count: usize,
}

/// `POST /students/enrollment-years/backfill`
pub async fn backfill_enrollment_years<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<EnrollmentYearsResponse>, ApiError>
where
  S: RaportStore,
{
  let updated = store
    .backfill_enrollment_years()
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(EnrollmentYearsResponse { success: true, updated_count: updated }))
}
