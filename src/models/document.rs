use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;

text_enum! {
    pub enum DocumentType as "document_type" {
        DeathCertificate => "death_certificate",
        BurialPermit => "burial_permit",
        Contract => "contract",
        Invoice => "invoice",
        Receipt => "receipt",
        Other => "other",
    }
}

text_enum! {
    /// `approved` and `rejected` are terminal.
    pub enum DocumentStatus as "document_status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub deceased_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub original_filename: String,
    /// Relative to the upload directory.
    pub file_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub document_type: DocumentType,
    pub uploaded_by: Option<Uuid>,
    pub status: DocumentStatus,
    pub review_notes: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
    pub status: Option<DocumentStatus>,
    pub document_type: Option<DocumentType>,
    pub booking_id: Option<Uuid>,
    pub deceased_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewDocumentRequest {
    pub status: DocumentStatus,
    pub notes: Option<String>,
}
