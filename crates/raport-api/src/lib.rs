//! JSON REST API for the raport promotion/history store.
//!
//! Exposes an axum [`Router`] backed by any [`raport_core::store::RaportStore`].
//! Auth, TLS, and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", raport_api::api_router(store.clone()))
//! ```

pub mod classes;
pub mod error;
pub mod histories;
pub mod periods;
pub mod promotions;
pub mod students;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post, put},
};
use raport_core::store::RaportStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: RaportStore + 'static,
{
  Router::new()
    // Registry
    .route("/academic-years", get(periods::list_years::<S>).post(periods::create_year::<S>))
    .route("/periods", get(periods::list_periods::<S>).post(periods::create_period::<S>))
    .route("/periods/resolve", get(periods::resolve::<S>))
    .route("/periods/{id}", get(periods::get_period::<S>))
    .route("/periods/{id}/activate", post(periods::activate_period::<S>))
    .route("/classes", get(classes::list::<S>).post(classes::create::<S>))
    .route("/classes/{id}", get(classes::get_one::<S>))
    .route(
      "/classes/{id}/successor",
      get(classes::successor::<S>).put(classes::set_successor::<S>),
    )
    .route("/students", get(students::list::<S>).post(students::enroll::<S>))
    .route(
      "/students/enrollment-years/backfill",
      post(students::backfill_enrollment_years::<S>),
    )
    .route("/students/{id}", get(students::get_one::<S>))
    .route("/students/{id}/histories", get(students::histories::<S>))
    .route("/students/{id}/assignment", get(students::assignment::<S>))
    .route("/students/{id}/consistency", get(students::consistency::<S>))
    // Ledger
    .route("/histories/backfill", post(histories::backfill::<S>))
    .route("/histories/missing", get(histories::missing::<S>))
    .route("/histories/{id}/notes", put(histories::update_notes::<S>))
    // Promotion
    .route("/promotions", post(promotions::promote::<S>))
    .route("/promotions/execute", post(promotions::execute::<S>))
    .route("/promotions/check", get(promotions::check::<S>))
    .route("/promotions/logs", get(promotions::list_logs::<S>))
    .route("/promotions/logs/{id}", get(promotions::get_log::<S>))
    .with_state(store)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
