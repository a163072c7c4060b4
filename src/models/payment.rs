use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;

text_enum! {
    pub enum PaymentRecordStatus as "payment_record_status" {
        Processing => "processing",
        Completed => "completed",
        Failed => "failed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub payment_method: String,
    pub transaction_id: String,
    pub mpesa_phone: Option<String>,
    pub status: PaymentRecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct InitiatePaymentRequest {
    pub booking_id: Uuid,
    pub amount: Decimal,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub status: PaymentRecordStatus,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub transaction_id: String,
    pub status: PaymentRecordStatus,
    pub booking_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PaymentQuery {
    pub status: Option<PaymentRecordStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub timeframe: Option<String>,
    #[serde(rename = "type")]
    pub report_type: Option<String>,
}
