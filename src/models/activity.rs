use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An activity log entry to record.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityEntry {
    /// Entity family, e.g. "booking", "document", "payment".
    pub kind: &'static str,
    pub action: &'static str,
    pub reference_id: Option<String>,
    pub details: String,
    pub user_id: Option<Uuid>,
}

impl ActivityEntry {
    pub fn new(kind: &'static str, action: &'static str, details: impl Into<String>) -> Self {
        Self { kind, action, reference_id: None, details: details.into(), user_id: None }
    }

    pub fn reference(mut self, id: impl ToString) -> Self {
        self.reference_id = Some(id.to_string());
        self
    }

    pub fn by(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub action: String,
    pub reference_id: Option<String>,
    pub details: String,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
