use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        auth::AuthenticatedUser,
        user::{Permission, UpdateUserRequest, User, UserQuery},
        Paginated,
    },
    services::users::UserService,
    AppState,
};

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Paginated<User>>> {
    user.authorize(Permission::ManageUsers)?;
    UserService::list(&state.db, &query).await.map(Json)
}

pub async fn get_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<User>> {
    UserService::get(&state.db, &user, id).await.map(Json)
}

pub async fn update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    UserService::update(&state.db, &state.activity, &user, id, &body).await.map(Json)
}

pub async fn delete_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    UserService::delete(&state.db, &state.activity, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
