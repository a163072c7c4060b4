use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{auth::AuthenticatedUser, user::Permission},
    services::auth::decode_token,
};

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".into()))?;

        let secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("JWT secret not configured")))?;

        decode_token(token, &secret.0)
            .map_err(|_| AppError::forbidden("Invalid or expired token"))
    }
}

/// Public routes that behave differently for signed-in callers. No header
/// means anonymous; a bad token is still rejected.
impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Option<Self>, Self::Rejection> {
        if !parts.headers.contains_key("Authorization") {
            return Ok(None);
        }
        <Self as FromRequestParts<S>>::from_request_parts(parts, state).await.map(Some)
    }
}

/// Extension type to carry the JWT secret through request extensions.
#[derive(Clone)]
pub struct JwtSecret(pub String);

impl AuthenticatedUser {
    pub fn can(&self, permission: Permission) -> bool {
        self.role.allows(permission)
    }

    /// Role gate applied per route.
    pub fn authorize(&self, permission: Permission) -> Result<(), AppError> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(AppError::forbidden("You do not have permission to perform this action"))
        }
    }

    /// Passes when the requester holds `permission` or is `owner`.
    pub fn authorize_owner_or(&self, owner: Option<Uuid>, permission: Permission) -> Result<(), AppError> {
        if self.can(permission) || owner == Some(self.user_id) {
            Ok(())
        } else {
            Err(AppError::forbidden("You do not have access to this resource"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;

    fn user(role: UserRole) -> AuthenticatedUser {
        AuthenticatedUser { user_id: Uuid::new_v4(), email: "u@x.com".into(), role }
    }

    #[test]
    fn owner_passes_without_permission() {
        let client = user(UserRole::Client);
        assert!(client.authorize_owner_or(Some(client.user_id), Permission::ViewAllBookings).is_ok());
        assert!(client.authorize_owner_or(Some(Uuid::new_v4()), Permission::ViewAllBookings).is_err());
        assert!(client.authorize_owner_or(None, Permission::ViewAllBookings).is_err());
    }

    #[test]
    fn staff_pass_through_permission() {
        let attendant = user(UserRole::MorgueAttendant);
        assert!(attendant.authorize_owner_or(None, Permission::ManageDeceased).is_ok());
        assert!(attendant.authorize_owner_or(None, Permission::ViewAllBookings).is_err());
        assert!(attendant.authorize(Permission::UpdatePaymentStatus).is_err());
    }
}
