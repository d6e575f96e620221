use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use carvia_domain::{AvailabilityRequest, CreateBookingRequest};

use crate::error::AppError;
use crate::extract::ApiJson;
use crate::middleware::{customer_auth_middleware, AuthUser};
use crate::state::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/{id}", get(get_booking).delete(cancel_booking))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            customer_auth_middleware,
        ));

    // Availability is an internal endpoint consumed by the search service;
    // it carries no caller identity.
    Router::new()
        .merge(protected)
        .route("/bookings/availability", post(check_availability))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.ledger.create_booking(user.id, &req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": booking })),
    ))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let bookings = state.ledger.get_user_bookings(user.id).await?;
    Ok(Json(json!({ "success": true, "data": bookings })))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.ledger.get_booking(id, user.id).await?;
    Ok(Json(json!({ "success": true, "data": booking })))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.ledger.cancel_booking(id, user.id).await?;
    Ok(Json(json!({ "success": true, "data": booking })))
}

async fn check_availability(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AvailabilityRequest>,
) -> Result<impl IntoResponse, AppError> {
    let availability = state.ledger.check_availability(&req).await?;
    Ok(Json(json!({ "success": true, "data": availability })))
}
