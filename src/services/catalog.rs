use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, FieldError},
    models::{
        activity::ActivityEntry,
        auth::AuthenticatedUser,
        service::{CreateServiceRequest, Service, ServiceQuery, UpdateServiceRequest},
        max_amount,
        user::Permission,
    },
    services::activity::ActivityLogger,
};

const SERVICE_COLS: &str =
    "id, name, description, price, duration_minutes, category, is_active, created_at, updated_at";

fn validate_price(price: Decimal, errors: &mut Vec<FieldError>) {
    if price.is_sign_negative() {
        errors.push(FieldError::new("price", "Price cannot be negative"));
    } else if price > max_amount() {
        errors.push(FieldError::new("price", "Price is too large"));
    }
}

fn validate_duration(duration: Option<i32>, errors: &mut Vec<FieldError>) {
    if matches!(duration, Some(d) if d <= 0) {
        errors.push(FieldError::new("duration_minutes", "Duration must be positive"));
    }
}

/// The funeral service catalog. Services are never hard-deleted.
pub struct CatalogService;

impl CatalogService {
    pub async fn list(
        pool: &PgPool,
        requester: Option<&AuthenticatedUser>,
        query: &ServiceQuery,
    ) -> AppResult<Vec<Service>> {
        let include_inactive = query.include_inactive.unwrap_or(false)
            && requester.is_some_and(|u| u.can(Permission::ManageServices));

        let services = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLS} FROM services
             WHERE ($1 OR is_active = TRUE)
               AND ($2::text IS NULL OR category = $2)
             ORDER BY category, name"
        ))
        .bind(include_inactive)
        .bind(query.category)
        .fetch_all(pool)
        .await?;
        Ok(services)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> AppResult<Service> {
        sqlx::query_as::<_, Service>(&format!("SELECT {SERVICE_COLS} FROM services WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Service not found"))
    }

    pub async fn create(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        req: &CreateServiceRequest,
    ) -> AppResult<Service> {
        requester.authorize(Permission::ManageServices)?;

        let mut errors = Vec::new();
        if req.name.trim().is_empty() {
            errors.push(FieldError::new("name", "Name is required"));
        }
        FieldError::check_len(&mut errors, "name", &req.name, 255);
        validate_price(req.price, &mut errors);
        validate_duration(req.duration_minutes, &mut errors);
        AppError::check(errors)?;

        let service = sqlx::query_as::<_, Service>(&format!(
            "INSERT INTO services (name, description, price, duration_minutes, category)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {SERVICE_COLS}"
        ))
        .bind(req.name.trim())
        .bind(&req.description)
        .bind(req.price)
        .bind(req.duration_minutes)
        .bind(req.category)
        .fetch_one(pool)
        .await?;

        activity.log(
            ActivityEntry::new("service", "created", format!("{} at {}", service.name, service.price))
                .reference(service.id)
                .by(requester.user_id),
        );
        Ok(service)
    }

    /// Price changes never touch existing bookings: line items keep their snapshot.
    pub async fn update(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
        req: &UpdateServiceRequest,
    ) -> AppResult<Service> {
        requester.authorize(Permission::ManageServices)?;

        let mut errors = Vec::new();
        if matches!(req.name.as_deref(), Some(n) if n.trim().is_empty()) {
            errors.push(FieldError::new("name", "Name cannot be empty"));
        }
        if let Some(name) = &req.name {
            FieldError::check_len(&mut errors, "name", name, 255);
        }
        if let Some(price) = req.price {
            validate_price(price, &mut errors);
        }
        validate_duration(req.duration_minutes, &mut errors);
        AppError::check(errors)?;

        let service = sqlx::query_as::<_, Service>(&format!(
            "UPDATE services
             SET name             = COALESCE($1, name),
                 description      = COALESCE($2, description),
                 price            = COALESCE($3, price),
                 duration_minutes = COALESCE($4, duration_minutes),
                 category         = COALESCE($5, category),
                 is_active        = COALESCE($6, is_active),
                 updated_at       = NOW()
             WHERE id = $7
             RETURNING {SERVICE_COLS}"
        ))
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(req.price)
        .bind(req.duration_minutes)
        .bind(req.category)
        .bind(req.is_active)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Service not found"))?;

        activity.log(
            ActivityEntry::new("service", "updated", service.name.clone())
                .reference(id)
                .by(requester.user_id),
        );
        Ok(service)
    }

    /// Soft delete.
    pub async fn deactivate(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
    ) -> AppResult<()> {
        requester.authorize(Permission::ManageServices)?;

        let name: Option<String> = sqlx::query_scalar(
            "UPDATE services SET is_active = FALSE, updated_at = NOW() WHERE id = $1 RETURNING name",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        let name = name.ok_or_else(|| AppError::not_found("Service not found"))?;

        activity.log(ActivityEntry::new("service", "deactivated", name).reference(id).by(requester.user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_must_be_non_negative_and_fit_the_column() {
        let mut errors = Vec::new();
        validate_price(Decimal::new(-1, 2), &mut errors);
        validate_price(Decimal::ZERO, &mut errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "price");
        validate_price(Decimal::new(10_000_000_000, 0), &mut errors);
        assert_eq!(errors[1].message, "Price is too large");
    }

    #[test]
    fn duration_must_be_positive_when_given() {
        let mut errors = Vec::new();
        validate_duration(None, &mut errors);
        validate_duration(Some(90), &mut errors);
        assert!(errors.is_empty());
        validate_duration(Some(0), &mut errors);
        assert_eq!(errors.len(), 1);
    }
}
