use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feedback {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
    pub rating: i16,
    pub comment: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// Feedback as shown on the public testimonials list.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PublicFeedback {
    pub id: Uuid,
    pub rating: i16,
    pub comment: Option<String>,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFeedbackRequest {
    pub booking_id: Option<Uuid>,
    pub rating: i16,
    pub comment: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}
