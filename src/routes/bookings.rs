use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        auth::AuthenticatedUser,
        booking::{
            Booking, BookingDetail, BookingLineItem, BookingQuery, BookingSummary,
            CreateBookingRequest, UpdateBookingStatusRequest, UpdateLineItemStatusRequest,
            UpdatePaymentStatusRequest,
        },
        Paginated,
    },
    services::bookings::BookingService,
    AppState,
};

pub async fn create_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateBookingRequest>,
) -> AppResult<(StatusCode, Json<BookingDetail>)> {
    let booking = BookingService::create(&state.db, &state.activity, &user, &body).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<BookingQuery>,
) -> AppResult<Json<Paginated<BookingSummary>>> {
    BookingService::list(&state.db, &user, &query).await.map(Json)
}

pub async fn get_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookingDetail>> {
    BookingService::get(&state.db, &user, id).await.map(Json)
}

/// PATCH /api/bookings/{id}/status (admin, morgue attendant)
pub async fn set_booking_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateBookingStatusRequest>,
) -> AppResult<Json<Booking>> {
    BookingService::set_status(&state.db, &state.activity, &user, id, body.status)
        .await
        .map(Json)
}

/// PATCH /api/bookings/{id}/payment-status (admin)
pub async fn set_payment_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdatePaymentStatusRequest>,
) -> AppResult<Json<Booking>> {
    BookingService::set_payment_status(&state.db, &state.activity, &user, id, body.payment_status)
        .await
        .map(Json)
}

pub async fn set_line_item_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, line_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateLineItemStatusRequest>,
) -> AppResult<Json<BookingLineItem>> {
    BookingService::set_line_item_status(&state.db, &state.activity, &user, id, line_id, body.status)
        .await
        .map(Json)
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Booking>> {
    BookingService::cancel(&state.db, &state.activity, &user, id).await.map(Json)
}

pub async fn delete_booking(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    BookingService::delete(&state.db, &state.activity, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
