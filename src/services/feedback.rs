use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, FieldError},
    models::{
        activity::ActivityEntry,
        auth::AuthenticatedUser,
        feedback::{CreateFeedbackRequest, Feedback, FeedbackQuery, PublicFeedback},
        user::Permission,
        PageQuery, Paginated,
    },
    services::{activity::ActivityLogger, bookings::BookingService},
};

const FEEDBACK_COLS: &str = "id, user_id, booking_id, rating, comment, is_public, created_at";

pub fn validate(req: &CreateFeedbackRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !(1..=5).contains(&req.rating) {
        errors.push(FieldError::new("rating", "Rating must be between 1 and 5"));
    }
    errors
}

pub struct FeedbackService;

impl FeedbackService {
    /// One entry per user and booking. The booking, when given, must be the
    /// requester's own.
    pub async fn submit(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        req: &CreateFeedbackRequest,
    ) -> AppResult<Feedback> {
        AppError::check(validate(req))?;

        if let Some(booking_id) = req.booking_id {
            let owner = BookingService::fetch_owner(pool, booking_id).await?;
            if owner != Some(requester.user_id) {
                return Err(AppError::forbidden("You can only review your own bookings"));
            }
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM feedback WHERE user_id = $1 AND booking_id = $2)",
            )
            .bind(requester.user_id)
            .bind(booking_id)
            .fetch_one(pool)
            .await?;
            if exists {
                return Err(AppError::conflict("Feedback already submitted for this booking"));
            }
        }

        let comment = req.comment.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let feedback = sqlx::query_as::<_, Feedback>(&format!(
            "INSERT INTO feedback (user_id, booking_id, rating, comment, is_public)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {FEEDBACK_COLS}"
        ))
        .bind(requester.user_id)
        .bind(req.booking_id)
        .bind(req.rating)
        .bind(comment)
        .bind(req.is_public)
        .fetch_one(pool)
        .await?;

        activity.log(
            ActivityEntry::new("feedback", "submitted", format!("rating {}", feedback.rating))
                .reference(feedback.id)
                .by(requester.user_id),
        );
        Ok(feedback)
    }

    pub async fn list_public(pool: &PgPool, query: &FeedbackQuery) -> AppResult<Paginated<PublicFeedback>> {
        let page = PageQuery::new(query.page, query.limit);
        let rows = sqlx::query_as::<_, PublicFeedback>(
            "SELECT f.id, f.rating, f.comment, u.name AS author_name, f.created_at
             FROM feedback f
             LEFT JOIN users u ON u.id = f.user_id
             WHERE f.is_public = TRUE
             ORDER BY f.created_at DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE is_public = TRUE")
            .fetch_one(pool)
            .await?;

        Ok(Paginated::new(rows, total, page))
    }

    /// Admins see everything, others their own entries.
    pub async fn list(
        pool: &PgPool,
        requester: &AuthenticatedUser,
        query: &FeedbackQuery,
    ) -> AppResult<Paginated<Feedback>> {
        let page = PageQuery::new(query.page, query.limit);
        let owner = (!requester.can(Permission::ModerateFeedback)).then_some(requester.user_id);

        let rows = sqlx::query_as::<_, Feedback>(&format!(
            "SELECT {FEEDBACK_COLS} FROM feedback
             WHERE ($1::uuid IS NULL OR user_id = $1)
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(owner)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE ($1::uuid IS NULL OR user_id = $1)")
                .bind(owner)
                .fetch_one(pool)
                .await?;

        Ok(Paginated::new(rows, total, page))
    }

    pub async fn delete(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
    ) -> AppResult<()> {
        requester.authorize(Permission::ModerateFeedback)?;
        let result = sqlx::query("DELETE FROM feedback WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Feedback not found"));
        }
        activity.log(ActivityEntry::new("feedback", "deleted", "").reference(id).by(requester.user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(rating: i16) -> CreateFeedbackRequest {
        CreateFeedbackRequest { booking_id: None, rating, comment: None, is_public: true }
    }

    #[test]
    fn rating_bounds() {
        assert!(validate(&request(1)).is_empty());
        assert!(validate(&request(5)).is_empty());
        assert_eq!(validate(&request(0))[0].field, "rating");
        assert_eq!(validate(&request(6)).len(), 1);
    }
}
