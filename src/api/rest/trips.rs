use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::operator_ids_from_env;
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::trip::Trip;
use crate::models::user::UserId;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips/:id", get(get_trip))
        .route("/drivers", get(list_drivers))
        .route("/operators/reload", post(reload_operators))
}

#[derive(Debug, Deserialize)]
pub struct ViewerParams {
    pub user_id: UserId,
}

/// Parties and operators only. Unknown ids get the same refusal as other
/// people's trips.
async fn get_trip(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(viewer): Query<ViewerParams>,
) -> Result<Json<Trip>, AppError> {
    let is_operator = state.operators.snapshot().is_operator(viewer.user_id);
    let trip = state
        .trips
        .get(&id)
        .filter(|trip| is_operator || trip.is_party(viewer.user_id))
        .ok_or(AppError::NotAuthorized)?;

    Ok(Json(trip))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    Query(viewer): Query<ViewerParams>,
) -> Result<Json<Vec<Driver>>, AppError> {
    if !state.operators.snapshot().is_operator(viewer.user_id) {
        return Err(AppError::NotAuthorized);
    }

    let mut drivers = state.users.all_drivers();
    drivers.sort_by_key(|driver| driver.user_id);
    Ok(Json(drivers))
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub operators: Vec<UserId>,
}

async fn reload_operators(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>, AppError> {
    let ids = operator_ids_from_env()?;
    let snapshot = state.operators.reload(ids);

    Ok(Json(ReloadResponse {
        operators: snapshot.ids().collect(),
    }))
}
