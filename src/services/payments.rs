use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::{
    error::{AppError, AppResult, FieldError},
    models::{
        activity::ActivityEntry,
        auth::AuthenticatedUser,
        booking::{BookingDetail, BookingSummary, PaymentStatus},
        payment::{
            InitiatePaymentRequest, InitiatePaymentResponse, Payment, PaymentQuery,
            PaymentRecordStatus, VerifyPaymentResponse,
        },
        max_amount,
        user::Permission,
        PageQuery, Paginated,
    },
    services::{
        activity::ActivityLogger,
        bookings::{BookingService, SUMMARY_SELECT},
        metrics,
        payment_provider::{ChargeRequest, PaymentProvider},
    },
};

const PAYMENT_COLS: &str =
    "p.id, p.booking_id, p.amount, p.payment_method, p.transaction_id, p.mpesa_phone, p.status,
     p.created_at, p.updated_at";

/// 9 to 15 digits, optionally prefixed with `+`.
pub fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    (9..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

pub fn validate_initiate(req: &InitiatePaymentRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    check_amount_and_phone(req.amount, &req.phone, &mut errors);
    errors
}

/// Shared by the simulated flow and the gateway push.
pub fn check_amount_and_phone(amount: Decimal, phone: &str, errors: &mut Vec<FieldError>) {
    if amount <= Decimal::ZERO {
        errors.push(FieldError::new("amount", "Amount must be greater than zero"));
    } else if amount > max_amount() {
        errors.push(FieldError::new("amount", "Amount is too large"));
    }
    if !is_valid_phone(phone.trim()) {
        errors.push(FieldError::new("phone", "Phone number must be 9 to 15 digits"));
    }
}

pub struct PaymentService;

impl PaymentService {
    /// The client's bookings that still accept payments, with line items.
    pub async fn list_pending(pool: &PgPool, requester: &AuthenticatedUser) -> AppResult<Vec<BookingDetail>> {
        let summaries = sqlx::query_as::<_, BookingSummary>(&format!(
            "{SUMMARY_SELECT}
             WHERE b.user_id = $1 AND b.payment_status IN ($2, $3)
             ORDER BY b.created_at DESC"
        ))
        .bind(requester.user_id)
        .bind(PaymentStatus::Pending)
        .bind(PaymentStatus::Partial)
        .fetch_all(pool)
        .await?;

        BookingService::with_line_items(pool, summaries).await
    }

    pub async fn initiate(
        pool: &PgPool,
        activity: &ActivityLogger,
        provider: &dyn PaymentProvider,
        requester: &AuthenticatedUser,
        req: &InitiatePaymentRequest,
    ) -> AppResult<InitiatePaymentResponse> {
        AppError::check(validate_initiate(req))?;
        let phone = req.phone.trim();

        let outstanding: Option<PaymentStatus> = sqlx::query_scalar(
            "SELECT payment_status FROM bookings WHERE id = $1 AND user_id = $2",
        )
        .bind(req.booking_id)
        .bind(requester.user_id)
        .fetch_optional(pool)
        .await?;
        if !outstanding.is_some_and(PaymentStatus::is_outstanding) {
            return Err(AppError::not_found("No outstanding booking found for payment"));
        }

        let charge = ChargeRequest { booking_id: req.booking_id, amount: req.amount, phone };
        let outcome = provider.initiate(&charge).await?;

        let mut tx = pool.begin().await?;
        let payment_id: uuid::Uuid = sqlx::query_scalar(
            "INSERT INTO payments (booking_id, amount, payment_method, transaction_id, mpesa_phone, status)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(req.booking_id)
        .bind(req.amount)
        .bind(provider.method())
        .bind(&outcome.transaction_id)
        .bind(phone)
        .bind(outcome.status)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE bookings SET payment_status = $1, updated_at = NOW() WHERE id = $2")
            .bind(provider.booking_status_on_initiate())
            .bind(req.booking_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        metrics::PAYMENTS_COUNTER.with_label_values(&[outcome.status.as_str()]).inc();
        tracing::info!(
            booking_id = %req.booking_id,
            transaction_id = %outcome.transaction_id,
            amount = %req.amount,
            "payment initiated"
        );
        activity.log(
            ActivityEntry::new("payment", "initiated", format!("{} via {}", req.amount, provider.method()))
                .reference(&outcome.transaction_id)
                .by(requester.user_id),
        );

        Ok(InitiatePaymentResponse {
            payment_id,
            transaction_id: outcome.transaction_id,
            status: outcome.status,
            message: outcome.message,
        })
    }

    /// Resolves a processing payment through the provider. Settled payments
    /// are returned as they are, so repeated calls give the same answer.
    pub async fn verify(
        pool: &PgPool,
        activity: &ActivityLogger,
        provider: &dyn PaymentProvider,
        requester: &AuthenticatedUser,
        transaction_id: &str,
    ) -> AppResult<VerifyPaymentResponse> {
        let row = sqlx::query_as::<_, PaymentWithOwner>(&format!(
            "SELECT {PAYMENT_COLS}, b.user_id AS owner_id
             FROM payments p
             JOIN bookings b ON b.id = p.booking_id
             WHERE p.transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Payment not found"))?;

        let PaymentWithOwner { payment, owner_id: owner } = row;
        if owner != Some(requester.user_id) {
            return Err(AppError::forbidden("Only the booking owner can verify this payment"));
        }

        if payment.status != PaymentRecordStatus::Processing {
            return Ok(VerifyPaymentResponse {
                transaction_id: payment.transaction_id,
                status: payment.status,
                booking_id: payment.booking_id,
            });
        }

        let status = provider.check_status(&payment).await?;
        if status != PaymentRecordStatus::Processing {
            let mut tx = pool.begin().await?;
            sqlx::query("UPDATE payments SET status = $1, updated_at = NOW() WHERE id = $2")
                .bind(status)
                .bind(payment.id)
                .execute(&mut *tx)
                .await?;
            if status == PaymentRecordStatus::Completed {
                sqlx::query("UPDATE bookings SET payment_status = $1, updated_at = NOW() WHERE id = $2")
                    .bind(provider.booking_status_on_complete())
                    .bind(payment.booking_id)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;

            metrics::PAYMENTS_COUNTER.with_label_values(&[status.as_str()]).inc();
            tracing::info!(transaction_id, %status, booking_id = %payment.booking_id, "payment settled");
            activity.log(
                ActivityEntry::new("payment", "verified", format!("status -> {status}"))
                    .reference(transaction_id)
                    .by(requester.user_id),
            );
        }

        Ok(VerifyPaymentResponse {
            transaction_id: payment.transaction_id,
            status,
            booking_id: payment.booking_id,
        })
    }

    pub async fn list(
        pool: &PgPool,
        requester: &AuthenticatedUser,
        query: &PaymentQuery,
    ) -> AppResult<Paginated<Payment>> {
        let page = PageQuery::new(query.page, query.limit);
        let owner = (!requester.can(Permission::ViewAllPayments)).then_some(requester.user_id);

        let filter = "($1::uuid IS NULL OR b.user_id = $1)
                      AND ($2::text IS NULL OR p.status = $2)";

        let rows = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLS}
             FROM payments p
             JOIN bookings b ON b.id = p.booking_id
             WHERE {filter}
             ORDER BY p.created_at DESC
             LIMIT $3 OFFSET $4"
        ))
        .bind(owner)
        .bind(query.status)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM payments p JOIN bookings b ON b.id = p.booking_id WHERE {filter}"
        ))
        .bind(owner)
        .bind(query.status)
        .fetch_one(pool)
        .await?;

        Ok(Paginated::new(rows, total, page))
    }
}

#[derive(sqlx::FromRow)]
struct PaymentWithOwner {
    #[sqlx(flatten)]
    payment: Payment,
    owner_id: Option<uuid::Uuid>,
}
