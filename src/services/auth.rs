use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, FieldError},
    models::{
        activity::ActivityEntry,
        auth::{AuthenticatedUser, Claims},
        user::{
            ChangePasswordRequest, CreateStaffRequest, LoginRequest, LoginResponse,
            RegisterRequest, User, UserRole,
        },
    },
    services::{activity::ActivityLogger, metrics},
};

pub const BCRYPT_COST: u32 = 12;
pub const MIN_PASSWORD_LEN: usize = 6;

/// Explicit column list for User.
pub const USER_COLS: &str =
    "id, name, email, password_hash, role, phone, address, created_at, updated_at";

pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| AppError::Internal(e.into()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_account_fields(name: &str, email: &str, password: &str) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if name.trim().is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    }
    FieldError::check_len(&mut errors, "name", name.trim(), 255);
    let email = email.trim();
    if email.is_empty() || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        errors.push(FieldError::new("email", "A valid email address is required"));
    }
    FieldError::check_len(&mut errors, "email", email, 255);
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    errors
}

/// Issue a signed session token embedding id, email and role.
pub fn issue_token(user: &User, secret: &str, ttl_seconds: u64) -> AppResult<String> {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        role: user.role,
        iat: now,
        exp: now + ttl_seconds as usize,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.into()))
}

pub fn decode_token(token: &str, secret: &str) -> anyhow::Result<AuthenticatedUser> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;

    let data = decode::<Claims>(token, &key, &validation)?;
    let claims = data.claims;

    Ok(AuthenticatedUser {
        user_id: claims.sub.parse()?,
        email: claims.email,
        role: claims.role,
    })
}

pub struct AuthService;

impl AuthService {
    /// Self-service registration. Always creates a client.
    pub async fn register(
        pool: &PgPool,
        activity: &ActivityLogger,
        req: &RegisterRequest,
    ) -> AppResult<User> {
        AppError::check(validate_account_fields(&req.name, &req.email, &req.password))?;
        let user = Self::insert_user(
            pool,
            &req.name,
            &req.email,
            &req.password,
            UserRole::Client,
            req.phone.as_deref(),
            req.address.as_deref(),
        )
        .await?;

        activity.log(
            ActivityEntry::new("user", "registered", format!("{} registered", user.email))
                .reference(user.id)
                .by(user.id),
        );
        Ok(user)
    }

    /// Admin-only creation of admin or morgue attendant accounts.
    pub async fn create_staff_user(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        req: &CreateStaffRequest,
    ) -> AppResult<User> {
        if requester.role != UserRole::Admin {
            return Err(AppError::forbidden("Only administrators can create staff accounts"));
        }
        if !req.role.is_staff() {
            return Err(AppError::bad_request("Staff role must be admin or morgue_attendant"));
        }
        AppError::check(validate_account_fields(&req.name, &req.email, &req.password))?;

        let user = Self::insert_user(
            pool,
            &req.name,
            &req.email,
            &req.password,
            req.role,
            req.phone.as_deref(),
            req.address.as_deref(),
        )
        .await?;

        activity.log(
            ActivityEntry::new("user", "staff_created", format!("{} as {}", user.email, user.role))
                .reference(user.id)
                .by(requester.user_id),
        );
        Ok(user)
    }

    /// Shared by registration, staff creation and the admin bootstrap CLI.
    pub async fn insert_user(
        pool: &PgPool,
        name: &str,
        email: &str,
        password: &str,
        role: UserRole,
        phone: Option<&str>,
        address: Option<&str>,
    ) -> AppResult<User> {
        let email = normalize_email(email);

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = $1)",
        )
        .bind(&email)
        .fetch_one(pool)
        .await?;
        if exists {
            return Err(AppError::conflict("Email is already registered"));
        }

        let password_hash = hash_password(password)?;

        // The unique index on LOWER(email) still catches a concurrent duplicate.
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, password_hash, role, phone, address)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLS}"
        ))
        .bind(name.trim())
        .bind(&email)
        .bind(&password_hash)
        .bind(role)
        .bind(phone)
        .bind(address)
        .fetch_one(pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::conflict("Email is already registered"),
            other => other,
        })?;

        Ok(user)
    }

    pub async fn login(
        pool: &PgPool,
        req: &LoginRequest,
        jwt_secret: &str,
        ttl_seconds: u64,
    ) -> AppResult<LoginResponse> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE LOWER(email) = $1"
        ))
        .bind(normalize_email(&req.email))
        .fetch_optional(pool)
        .await?;

        let Some(user) = user.filter(|u| verify_password(&req.password, &u.password_hash)) else {
            metrics::LOGINS_COUNTER.with_label_values(&["failure"]).inc();
            return Err(AppError::Unauthorized("Invalid email or password".into()));
        };

        metrics::LOGINS_COUNTER.with_label_values(&["success"]).inc();
        let token = issue_token(&user, jwt_secret, ttl_seconds)?;
        Ok(LoginResponse { token, user })
    }

    pub async fn me(pool: &PgPool, user_id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    pub async fn change_password(
        pool: &PgPool,
        activity: &ActivityLogger,
        user_id: Uuid,
        req: &ChangePasswordRequest,
    ) -> AppResult<()> {
        if req.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation {
                message: "Validation failed".into(),
                errors: vec![FieldError::new(
                    "new_password",
                    format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
                )],
            });
        }

        let user = Self::me(pool, user_id).await?;
        if !verify_password(&req.current_password, &user.password_hash) {
            return Err(AppError::Unauthorized("Current password is incorrect".into()));
        }

        let hash = hash_password(&req.new_password)?;
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(hash)
            .bind(user_id)
            .execute(pool)
            .await?;

        activity.log(ActivityEntry::new("user", "password_changed", "").reference(user_id).by(user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ama".into(),
            email: "a@x.com".into(),
            password_hash: String::new(),
            role,
            phone: None,
            address: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn token_carries_identity() {
        let user = sample_user(UserRole::MorgueAttendant);
        let token = issue_token(&user, "secret", 60).unwrap();
        let decoded = decode_token(&token, "secret").unwrap();
        assert_eq!(decoded.user_id, user.id);
        assert_eq!(decoded.email, "a@x.com");
        assert_eq!(decoded.role, UserRole::MorgueAttendant);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = issue_token(&sample_user(UserRole::Client), "secret", 60).unwrap();
        assert!(decode_token(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let user = sample_user(UserRole::Admin);
        let past = (Utc::now().timestamp() - 120) as usize;
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
            iat: past - 60,
            exp: past,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(decode_token(&token, "secret").is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = bcrypt::hash("secret1", 4).unwrap();
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-hash"));
    }

    #[test]
    fn account_validation_reports_each_field() {
        let errors = validate_account_fields(" ", "nope", "123");
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["name", "email", "password"]);
        assert!(validate_account_fields("Ama", "a@x.com", "secret1").is_empty());
    }

    #[test]
    fn overlong_name_and_email_are_rejected() {
        let email = format!("{}@x.com", "a".repeat(250));
        let errors = validate_account_fields(&"n".repeat(256), &email, "secret1");
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["name", "email"]);
    }

    #[test]
    fn emails_are_compared_lowercase() {
        assert_eq!(normalize_email("  A@X.com "), "a@x.com");
    }
}
