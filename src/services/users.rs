use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        activity::ActivityEntry,
        auth::AuthenticatedUser,
        user::{Permission, UpdateUserRequest, User, UserQuery},
        PageQuery, Paginated,
    },
    services::{activity::ActivityLogger, auth::USER_COLS},
};

pub struct UserService;

impl UserService {
    pub async fn list(pool: &PgPool, query: &UserQuery) -> AppResult<Paginated<User>> {
        let page = PageQuery::new(query.page, query.limit);
        let search = query.search.as_deref().map(|s| format!("%{}%", s.trim()));

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users
             WHERE ($1::text IS NULL OR role = $1)
               AND ($2::text IS NULL OR name ILIKE $2 OR email ILIKE $2)
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4"
        ))
        .bind(query.role)
        .bind(&search)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users
             WHERE ($1::text IS NULL OR role = $1)
               AND ($2::text IS NULL OR name ILIKE $2 OR email ILIKE $2)",
        )
        .bind(query.role)
        .bind(&search)
        .fetch_one(pool)
        .await?;

        Ok(Paginated::new(users, total, page))
    }

    pub async fn get(pool: &PgPool, requester: &AuthenticatedUser, id: Uuid) -> AppResult<User> {
        requester.authorize_owner_or(Some(id), Permission::ManageUsers)?;
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    /// Profile edit. Only admins may change a role.
    pub async fn update(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
        req: &UpdateUserRequest,
    ) -> AppResult<User> {
        requester.authorize_owner_or(Some(id), Permission::ManageUsers)?;
        if req.role.is_some() {
            requester.authorize(Permission::ManageUsers)?;
        }
        if matches!(req.name.as_deref(), Some(n) if n.trim().is_empty()) {
            return Err(AppError::bad_request("Name cannot be empty"));
        }
        if matches!(req.name.as_deref(), Some(n) if n.trim().chars().count() > 255) {
            return Err(AppError::bad_request("Name must be at most 255 characters"));
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET name       = COALESCE($1, name),
                 phone      = COALESCE($2, phone),
                 address    = COALESCE($3, address),
                 role       = COALESCE($4, role),
                 updated_at = NOW()
             WHERE id = $5
             RETURNING {USER_COLS}"
        ))
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.phone)
        .bind(&req.address)
        .bind(req.role)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

        activity.log(
            ActivityEntry::new("user", "updated", format!("profile of {}", user.email))
                .reference(id)
                .by(requester.user_id),
        );
        Ok(user)
    }

    /// Bookings and documents keep their rows; their user references are nulled by the schema.
    pub async fn delete(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
    ) -> AppResult<()> {
        requester.authorize(Permission::ManageUsers)?;
        if requester.user_id == id {
            return Err(AppError::bad_request("You cannot delete your own account"));
        }

        let email: Option<String> = sqlx::query_scalar("DELETE FROM users WHERE id = $1 RETURNING email")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        let email = email.ok_or_else(|| AppError::not_found("User not found"))?;

        activity.log(
            ActivityEntry::new("user", "deleted", email).reference(id).by(requester.user_id),
        );
        Ok(())
    }
}
