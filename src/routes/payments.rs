use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use bytes::Bytes;
use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    models::{
        activity::ActivityEntry,
        auth::AuthenticatedUser,
        booking::BookingDetail,
        payment::{
            InitiatePaymentRequest, InitiatePaymentResponse, Payment, PaymentQuery, ReportQuery,
            VerifyPaymentResponse,
        },
        Paginated,
    },
    services::{
        mpesa::{callback_summary, CallbackAck, MpesaClient, StkPushRequest},
        payments::PaymentService,
        reports::{ReportService, XLSX_CONTENT_TYPE},
    },
    AppState,
};

pub async fn list_pending(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<BookingDetail>>> {
    PaymentService::list_pending(&state.db, &user).await.map(Json)
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<InitiatePaymentRequest>,
) -> AppResult<(StatusCode, Json<InitiatePaymentResponse>)> {
    let res = PaymentService::initiate(&state.db, &state.activity, state.payments.as_ref(), &user, &body).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(transaction_id): Path<String>,
) -> AppResult<Json<VerifyPaymentResponse>> {
    PaymentService::verify(&state.db, &state.activity, state.payments.as_ref(), &user, &transaction_id)
        .await
        .map(Json)
}

pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<PaymentQuery>,
) -> AppResult<Json<Paginated<Payment>>> {
    PaymentService::list(&state.db, &user, &query).await.map(Json)
}

/// GET /api/payments/report?timeframe=month&type=full (admin)
pub async fn generate_report(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ReportQuery>,
) -> AppResult<Response> {
    let report = ReportService::generate(&state.db, &user, &state.config.report_dir, &query).await?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, XLSX_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, report.bytes.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", report.filename),
        )
        .body(Body::from(report.bytes))
        .map_err(|e| AppError::Internal(e.into()))
}

// ── Mobile-money gateway ────────────────────────────────────────────────────

fn gateway(state: &AppState) -> AppResult<&MpesaClient> {
    state
        .mpesa
        .as_deref()
        .ok_or_else(|| AppError::Unavailable("Mobile-money gateway is not configured".into()))
}

pub async fn mpesa_stk_push(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(body): Json<StkPushRequest>,
) -> AppResult<Json<Value>> {
    AppError::check(body.validate())?;
    let client = gateway(&state)?;
    Ok(Json(client.stk_push(&body).await?))
}

pub async fn mpesa_query(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(checkout_request_id): Path<String>,
) -> AppResult<Json<Value>> {
    let client = gateway(&state)?;
    Ok(Json(client.stk_query(&checkout_request_id).await?))
}

/// Public receiver for gateway callbacks. Always acknowledged.
pub async fn mpesa_callback(State(state): State<AppState>, body: Bytes) -> Json<CallbackAck> {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    match callback_summary(&body) {
        Some((checkout, code)) => {
            tracing::info!(%checkout, result_code = code, "gateway callback received");
            state.activity.log(
                ActivityEntry::new("payment", "gateway_callback", format!("result code {code}"))
                    .reference(checkout),
            );
        }
        None => tracing::warn!("unrecognised gateway callback body"),
    }
    Json(CallbackAck::accepted())
}
