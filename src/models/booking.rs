use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;

text_enum! {
    pub enum BookingStatus as "booking_status" {
        Pending => "pending",
        Confirmed => "confirmed",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    pub enum PaymentStatus as "payment_status" {
        Pending => "pending",
        Partial => "partial",
        Paid => "paid",
        Refunded => "refunded",
    }
}

text_enum! {
    pub enum LineItemStatus as "line_item_status" {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl PaymentStatus {
    /// Bookings in these states still accept payments.
    pub fn is_outstanding(self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Partial)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub deceased_id: Uuid,
    pub status: BookingStatus,
    pub total_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One service line of a booking. `price_at_booking` is a snapshot of the
/// catalog price when the booking was made and is never recalculated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookingLineItem {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub quantity: i32,
    pub price_at_booking: Decimal,
    pub scheduled_date: Option<NaiveDate>,
    pub status: LineItemStatus,
}

/// Booking row joined with the deceased and client names.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BookingSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub booking: Booking,
    pub deceased_name: String,
    pub client_name: Option<String>,
    pub client_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BookingDetail {
    #[serde(flatten)]
    pub summary: BookingSummary,
    pub services: Vec<BookingLineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineItemInput {
    pub service_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub scheduled_date: Option<NaiveDate>,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub deceased_id: Uuid,
    pub services: Vec<LineItemInput>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentStatusRequest {
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLineItemStatusRequest {
    pub status: LineItemStatus,
}

#[derive(Debug, Deserialize)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
