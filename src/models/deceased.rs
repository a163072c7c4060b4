use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;

text_enum! {
    pub enum PreparationStatus as "preparation_status" {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
    }
}

text_enum! {
    pub enum ReleaseStatus as "release_status" {
        InStorage => "in_storage",
        Released => "released",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Deceased {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: NaiveDate,
    pub place_of_death: Option<String>,
    pub cause_of_death: Option<String>,
    pub gender: Option<String>,
    pub identity_number: Option<String>,
    pub religion: Option<String>,
    pub notes: Option<String>,
    pub storage_location: Option<String>,
    pub preparation_status: PreparationStatus,
    pub release_status: ReleaseStatus,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NextOfKin {
    pub id: Uuid,
    pub deceased_id: Uuid,
    pub name: String,
    pub relationship: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DeceasedDetail {
    #[serde(flatten)]
    pub deceased: Deceased,
    pub next_of_kin: Vec<NextOfKin>,
}

#[derive(Debug, Deserialize)]
pub struct NextOfKinInput {
    pub name: String,
    pub relationship: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateDeceasedRequest {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: NaiveDate,
    pub place_of_death: Option<String>,
    pub cause_of_death: Option<String>,
    pub gender: Option<String>,
    pub identity_number: Option<String>,
    pub religion: Option<String>,
    pub notes: Option<String>,
    pub storage_location: Option<String>,
    #[serde(default)]
    pub next_of_kin: Vec<NextOfKinInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeceasedRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
    pub place_of_death: Option<String>,
    pub cause_of_death: Option<String>,
    pub gender: Option<String>,
    pub identity_number: Option<String>,
    pub religion: Option<String>,
    pub notes: Option<String>,
    pub storage_location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeceasedStatusRequest {
    pub preparation_status: Option<PreparationStatus>,
    pub release_status: Option<ReleaseStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNextOfKinRequest {
    pub name: Option<String>,
    pub relationship: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub is_primary: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DeceasedQuery {
    pub search: Option<String>,
    pub preparation_status: Option<PreparationStatus>,
    pub release_status: Option<ReleaseStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
