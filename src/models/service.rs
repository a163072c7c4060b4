use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;

text_enum! {
    pub enum ServiceCategory as "service_category" {
        Preparation => "preparation",
        Ceremony => "ceremony",
        Burial => "burial",
        Cremation => "cremation",
        Transportation => "transportation",
        Other => "other",
    }
}

/// A funeral service offered in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub duration_minutes: Option<i32>,
    pub category: ServiceCategory,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub duration_minutes: Option<i32>,
    pub category: ServiceCategory,
}

#[derive(Debug, Deserialize)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub duration_minutes: Option<i32>,
    pub category: Option<ServiceCategory>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceQuery {
    pub category: Option<ServiceCategory>,
    /// Honoured for admins only.
    pub include_inactive: Option<bool>,
}
