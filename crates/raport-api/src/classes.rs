//! Handlers for `/classes` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/classes` | |
//! | `POST` | `/classes` | Body: `{name, capacity?, homeroomTeacherId?, nextClassId?}` |
//! | `GET`  | `/classes/{id}` | 404 if not found |
//! | `GET`  | `/classes/{id}/successor` | `null` for terminal classes |
//! | `PUT`  | `/classes/{id}/successor` | Body: `{"nextClassId": 2}` or `{"nextClassId": null}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use raport_core::{
  registry::{ClassRoom, NewClassRoom},
  store::RaportStore,
};
use serde::Deserialize;

use crate::error::{ApiError, required};

/// `GET /classes`
pub async fn list<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<ClassRoom>>, ApiError>
where
  S: RaportStore,
{
  let classes = store.list_classes().await.map_err(ApiError::from_store)?;
  Ok(Json(classes))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
  #[serde(alias = "nama_kelas", alias = "namaKelas")]
  pub name:                Option<String>,
  #[serde(alias = "kapasitas")]
  pub capacity:            Option<i64>,
  #[serde(alias = "homeroom_teacher_id", alias = "waliKelasId", alias = "wali_kelas_id")]
  pub homeroom_teacher_id: Option<i64>,
  #[serde(alias = "next_class_id")]
  pub next_class_id:       Option<i64>,
}

/// `POST /classes`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RaportStore,
{
  let input = NewClassRoom {
    name:                required(body.name, "name")?,
    capacity:            body.capacity,
    homeroom_teacher_id: body.homeroom_teacher_id,
    next_class_id:       body.next_class_id,
  };
  let class = store.create_class(input).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(class)))
}

/// `GET /classes/{id}`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<Json<ClassRoom>, ApiError>
where
  S: RaportStore,
{
  let class = store
    .get_class(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("class {id} not found")))?;
  Ok(Json(class))
}

/// `GET /classes/{id}/successor`
pub async fn successor<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
) -> Result<Json<Option<ClassRoom>>, ApiError>
where
  S: RaportStore,
{
  let next = store.get_successor_class(id).await.map_err(ApiError::from_store)?;
  Ok(Json(next))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessorBody {
  #[serde(alias = "next_class_id")]
  pub next_class_id: Option<i64>,
}

/// `PUT /classes/{id}/successor`
pub async fn set_successor<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<i64>,
  Json(body): Json<SuccessorBody>,
) -> Result<Json<ClassRoom>, ApiError>
where
  S: RaportStore,
{
  let class = store
    .set_successor_class(id, body.next_class_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(class))
}
