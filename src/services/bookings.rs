use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, FieldError},
    models::{
        activity::ActivityEntry,
        auth::AuthenticatedUser,
        booking::{
            Booking, BookingDetail, BookingLineItem, BookingQuery, BookingStatus,
            BookingSummary, CreateBookingRequest, LineItemInput, LineItemStatus, PaymentStatus,
        },
        max_amount,
        user::Permission,
        PageQuery, Paginated,
    },
    services::{activity::ActivityLogger, deceased::DeceasedService, metrics},
};

pub const BOOKING_COLS: &str =
    "b.id, b.user_id, b.deceased_id, b.status, b.total_amount, b.payment_status, b.notes,
     b.created_at, b.updated_at";

/// Booking columns plus the joined deceased and client names.
pub const SUMMARY_SELECT: &str =
    "SELECT b.id, b.user_id, b.deceased_id, b.status, b.total_amount, b.payment_status, b.notes,
            b.created_at, b.updated_at,
            d.first_name || ' ' || d.last_name AS deceased_name,
            u.name AS client_name,
            u.email AS client_email
     FROM bookings b
     JOIN deceased d ON d.id = b.deceased_id
     LEFT JOIN users u ON u.id = b.user_id";

const LINE_SELECT: &str =
    "SELECT bs.id, bs.booking_id, bs.service_id, s.name AS service_name, bs.quantity,
            bs.price_at_booking, bs.scheduled_date, bs.status
     FROM booking_services bs
     JOIN services s ON s.id = bs.service_id";

/// Per line item.
pub const MAX_QUANTITY: i32 = 1_000;

pub fn line_total(price: Decimal, quantity: i32) -> Decimal {
    price * Decimal::from(quantity)
}

/// Σ price × quantity over the line items.
pub fn compute_total<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    lines.into_iter().map(|(price, qty)| line_total(price, qty)).sum()
}

pub fn validate_line_items(items: &[LineItemInput]) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if items.is_empty() {
        errors.push(FieldError::new("services", "At least one service is required"));
    }
    for (i, item) in items.iter().enumerate() {
        if item.quantity < 1 {
            errors.push(FieldError::new(
                &format!("services[{i}].quantity"),
                "Quantity must be at least 1",
            ));
        } else if item.quantity > MAX_QUANTITY {
            errors.push(FieldError::new(
                &format!("services[{i}].quantity"),
                format!("Quantity must be at most {MAX_QUANTITY}"),
            ));
        }
    }
    errors
}

pub struct BookingService;

impl BookingService {
    /// Creates the booking and its line items in one transaction. Prices are
    /// snapshotted from the catalog; the total is fixed from then on.
    pub async fn create(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        req: &CreateBookingRequest,
    ) -> AppResult<BookingDetail> {
        AppError::check(validate_line_items(&req.services))?;
        // Any client may book for a registered deceased; only existence is checked.
        DeceasedService::fetch(pool, req.deceased_id).await?;

        let mut tx = pool.begin().await?;

        let mut priced = Vec::with_capacity(req.services.len());
        for item in &req.services {
            let price: Option<Decimal> = sqlx::query_scalar(
                "SELECT price FROM services WHERE id = $1 AND is_active = TRUE",
            )
            .bind(item.service_id)
            .fetch_optional(&mut *tx)
            .await?;
            let price = price.ok_or_else(|| {
                AppError::bad_request(format!(
                    "Service {} not found or inactive",
                    item.service_id
                ))
            })?;
            priced.push((item, price));
        }

        let total = compute_total(priced.iter().map(|(item, price)| (*price, item.quantity)));
        if total > max_amount() {
            return Err(AppError::Validation {
                message: "Validation failed".into(),
                errors: vec![FieldError::new("services", "Booking total is too large")],
            });
        }

        let booking_id: Uuid = sqlx::query_scalar(
            "INSERT INTO bookings (user_id, deceased_id, status, total_amount, payment_status, notes)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(requester.user_id)
        .bind(req.deceased_id)
        .bind(BookingStatus::Pending)
        .bind(total)
        .bind(PaymentStatus::Pending)
        .bind(&req.notes)
        .fetch_one(&mut *tx)
        .await?;

        for (item, price) in &priced {
            sqlx::query(
                "INSERT INTO booking_services
                    (booking_id, service_id, quantity, price_at_booking, scheduled_date, status)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(booking_id)
            .bind(item.service_id)
            .bind(item.quantity)
            .bind(*price)
            .bind(item.scheduled_date)
            .bind(LineItemStatus::Pending)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        metrics::BOOKINGS_COUNTER.with_label_values(&["api"]).inc();
        tracing::info!(%booking_id, %total, lines = priced.len(), "booking created");
        activity.log(
            ActivityEntry::new("booking", "created", format!("total {total}"))
                .reference(booking_id)
                .by(requester.user_id),
        );

        Self::detail(pool, booking_id).await
    }

    pub async fn list(
        pool: &PgPool,
        requester: &AuthenticatedUser,
        query: &BookingQuery,
    ) -> AppResult<Paginated<BookingSummary>> {
        let page = PageQuery::new(query.page, query.limit);
        // Anyone without ViewAllBookings only ever sees their own rows.
        let owner = (!requester.can(Permission::ViewAllBookings)).then_some(requester.user_id);

        let filter = "($1::uuid IS NULL OR b.user_id = $1)
                      AND ($2::text IS NULL OR b.status = $2)
                      AND ($3::text IS NULL OR b.payment_status = $3)";

        let rows = sqlx::query_as::<_, BookingSummary>(&format!(
            "{SUMMARY_SELECT}
             WHERE {filter}
             ORDER BY b.created_at DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(owner)
        .bind(query.status)
        .bind(query.payment_status)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM bookings b WHERE {filter}"))
            .bind(owner)
            .bind(query.status)
            .bind(query.payment_status)
            .fetch_one(pool)
            .await?;

        Ok(Paginated::new(rows, total, page))
    }

    async fn summary(pool: &PgPool, id: Uuid) -> AppResult<BookingSummary> {
        sqlx::query_as::<_, BookingSummary>(&format!("{SUMMARY_SELECT} WHERE b.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Booking not found"))
    }

    async fn detail(pool: &PgPool, id: Uuid) -> AppResult<BookingDetail> {
        let summary = Self::summary(pool, id).await?;
        let services = Self::line_items(pool, id).await?;
        Ok(BookingDetail { summary, services })
    }

    pub async fn line_items(pool: &PgPool, booking_id: Uuid) -> AppResult<Vec<BookingLineItem>> {
        let rows = sqlx::query_as::<_, BookingLineItem>(&format!(
            "{LINE_SELECT} WHERE bs.booking_id = $1 ORDER BY bs.created_at, bs.id"
        ))
        .bind(booking_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Attaches line items to each summary with a single query.
    pub async fn with_line_items(
        pool: &PgPool,
        summaries: Vec<BookingSummary>,
    ) -> AppResult<Vec<BookingDetail>> {
        let ids: Vec<Uuid> = summaries.iter().map(|s| s.booking.id).collect();
        let lines = sqlx::query_as::<_, BookingLineItem>(&format!(
            "{LINE_SELECT} WHERE bs.booking_id = ANY($1) ORDER BY bs.created_at, bs.id"
        ))
        .bind(&ids)
        .fetch_all(pool)
        .await?;

        let mut by_booking: HashMap<Uuid, Vec<BookingLineItem>> = HashMap::new();
        for line in lines {
            by_booking.entry(line.booking_id).or_default().push(line);
        }

        Ok(summaries
            .into_iter()
            .map(|summary| {
                let services = by_booking.remove(&summary.booking.id).unwrap_or_default();
                BookingDetail { summary, services }
            })
            .collect())
    }

    /// NotFound when absent, Forbidden unless admin or the owning client.
    pub async fn get(pool: &PgPool, requester: &AuthenticatedUser, id: Uuid) -> AppResult<BookingDetail> {
        let detail = Self::detail(pool, id).await?;
        requester.authorize_owner_or(detail.summary.booking.user_id, Permission::ViewAllBookings)?;
        Ok(detail)
    }

    /// Owner check used by documents, payments and feedback.
    pub async fn fetch_owner(pool: &PgPool, id: Uuid) -> AppResult<Option<Uuid>> {
        let row: Option<(Option<Uuid>,)> = sqlx::query_as("SELECT user_id FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        row.map(|(owner,)| owner).ok_or_else(|| AppError::not_found("Booking not found"))
    }

    /// Writes the new status unconditionally: no transition graph is enforced.
    pub async fn set_status(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
        status: BookingStatus,
    ) -> AppResult<Booking> {
        requester.authorize(Permission::UpdateBookingStatus)?;

        let booking = sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings b SET status = $1, updated_at = NOW()
             WHERE b.id = $2
             RETURNING {BOOKING_COLS}"
        ))
        .bind(status)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Booking not found"))?;

        tracing::info!(booking_id = %id, %status, "booking status set");
        activity.log(
            ActivityEntry::new("booking", "status_changed", format!("status -> {status}"))
                .reference(id)
                .by(requester.user_id),
        );
        Ok(booking)
    }

    /// Admin-only, same unconditional write as [`BookingService::set_status`].
    pub async fn set_payment_status(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
        payment_status: PaymentStatus,
    ) -> AppResult<Booking> {
        requester.authorize(Permission::UpdatePaymentStatus)?;

        let booking = sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings b SET payment_status = $1, updated_at = NOW()
             WHERE b.id = $2
             RETURNING {BOOKING_COLS}"
        ))
        .bind(payment_status)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Booking not found"))?;

        tracing::info!(booking_id = %id, %payment_status, "booking payment status set");
        activity.log(
            ActivityEntry::new(
                "booking",
                "payment_status_changed",
                format!("payment_status -> {payment_status}"),
            )
            .reference(id)
            .by(requester.user_id),
        );
        Ok(booking)
    }

    pub async fn set_line_item_status(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        booking_id: Uuid,
        line_id: Uuid,
        status: LineItemStatus,
    ) -> AppResult<BookingLineItem> {
        requester.authorize(Permission::UpdateBookingStatus)?;

        let updated = sqlx::query(
            "UPDATE booking_services SET status = $1 WHERE id = $2 AND booking_id = $3",
        )
        .bind(status)
        .bind(line_id)
        .bind(booking_id)
        .execute(pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(AppError::not_found("Booking line item not found"));
        }

        let line = sqlx::query_as::<_, BookingLineItem>(&format!("{LINE_SELECT} WHERE bs.id = $1"))
            .bind(line_id)
            .fetch_one(pool)
            .await?;

        activity.log(
            ActivityEntry::new("booking", "line_status_changed", format!("{} -> {status}", line.service_name))
                .reference(booking_id)
                .by(requester.user_id),
        );
        Ok(line)
    }

    /// A client may withdraw their own booking while it is still pending.
    pub async fn cancel(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
    ) -> AppResult<Booking> {
        let owner = Self::fetch_owner(pool, id).await?;
        if owner != Some(requester.user_id) {
            return Err(AppError::forbidden("You can only cancel your own bookings"));
        }

        let booking = sqlx::query_as::<_, Booking>(&format!(
            "UPDATE bookings b SET status = $1, updated_at = NOW()
             WHERE b.id = $2 AND b.status = $3
             RETURNING {BOOKING_COLS}"
        ))
        .bind(BookingStatus::Cancelled)
        .bind(id)
        .bind(BookingStatus::Pending)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::bad_request("Only pending bookings can be cancelled"))?;

        activity.log(ActivityEntry::new("booking", "cancelled", "by client").reference(id).by(requester.user_id));
        Ok(booking)
    }

    /// Line items cascade; documents keep the row with a null booking reference.
    pub async fn delete(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
    ) -> AppResult<()> {
        requester.authorize(Permission::DeleteBookings)?;

        let result = sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Conflict(_) => {
                    AppError::conflict("Booking has recorded payments and cannot be deleted")
                }
                other => other,
            })?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Booking not found"));
        }

        activity.log(ActivityEntry::new("booking", "deleted", "").reference(id).by(requester.user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i32) -> LineItemInput {
        LineItemInput { service_id: Uuid::new_v4(), quantity, scheduled_date: None }
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let total = compute_total([(Decimal::new(100, 0), 2), (Decimal::new(50, 0), 1)]);
        assert_eq!(total, Decimal::new(250, 0));
    }

    #[test]
    fn total_keeps_cents() {
        let total = compute_total([(Decimal::new(1999, 2), 3)]);
        assert_eq!(total.to_string(), "59.97");
        assert_eq!(compute_total(Vec::new()), Decimal::ZERO);
    }

    #[test]
    fn empty_booking_is_rejected() {
        let errors = validate_line_items(&[]);
        assert_eq!(errors[0].field, "services");
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let errors = validate_line_items(&[item(1), item(0)]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "services[1].quantity");
    }

    #[test]
    fn huge_quantity_is_rejected() {
        let errors = validate_line_items(&[item(MAX_QUANTITY), item(2_000_000_000)]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "services[1].quantity");
        assert_eq!(errors[0].message, "Quantity must be at most 1000");
    }

    #[test]
    fn quantity_cap_alone_does_not_bound_the_total() {
        let top_price = Decimal::new(999_999_999, 2);
        assert!(line_total(top_price, MAX_QUANTITY) > max_amount());
        assert!(line_total(Decimal::new(100, 0), MAX_QUANTITY) <= max_amount());
    }
}
