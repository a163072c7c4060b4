use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    models::{
        auth::AuthenticatedUser,
        user::{ChangePasswordRequest, CreateStaffRequest, LoginRequest, LoginResponse, RegisterRequest, User},
    },
    services::auth::AuthService,
    AppState,
};

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = AuthService::register(&state.db, &state.activity, &body).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    AuthService::login(&state.db, &body, &state.config.jwt_secret, state.config.jwt_expiry_seconds)
        .await
        .map(Json)
}

pub async fn me(State(state): State<AppState>, user: AuthenticatedUser) -> AppResult<Json<User>> {
    AuthService::me(&state.db, user.user_id).await.map(Json)
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<Value>> {
    AuthService::change_password(&state.db, &state.activity, user.user_id, &body).await?;
    Ok(Json(json!({ "message": "Password updated" })))
}

/// POST /api/auth/staff (admin)
pub async fn create_staff(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateStaffRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let created = AuthService::create_staff_user(&state.db, &state.activity, &user, &body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
