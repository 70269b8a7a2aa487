use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;
use crate::types::tour::FinishedTour;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tours", get(list_tours))
        .route("/api/tours/:id", get(get_tour))
}

#[derive(Serialize, Deserialize)]
struct TourSummary {
    tour_id: i64,
    start_time: DateTime<FixedOffset>,
    title: Option<String>,
    distance: f32,
    elapsed_time: i64,
    device_id: String,
    tour_type: Option<String>,
    markers: usize,
}

impl From<&FinishedTour> for TourSummary {
    fn from(tour: &FinishedTour) -> Self {
        Self {
            tour_id: tour.tour_id,
            start_time: tour.start_time,
            title: tour.title.clone(),
            distance: tour.distance,
            elapsed_time: tour.elapsed_time,
            device_id: tour.device_id.clone(),
            tour_type: tour.tour_type.as_ref().map(|t| t.name.clone()),
            markers: tour.markers.len(),
        }
    }
}

async fn list_tours(State(state): State<AppState>) -> Json<Vec<TourSummary>> {
    Json(state.tours().iter().map(TourSummary::from).collect())
}

async fn get_tour(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<FinishedTour>, AppError> {
    state
        .get(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(id.to_string()))
}
