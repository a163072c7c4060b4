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
        deceased::{
            CreateDeceasedRequest, Deceased, DeceasedDetail, DeceasedQuery, NextOfKin,
            NextOfKinInput, UpdateDeceasedRequest, UpdateDeceasedStatusRequest,
            UpdateNextOfKinRequest,
        },
        Paginated,
    },
    services::deceased::DeceasedService,
    AppState,
};

pub async fn create_deceased(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateDeceasedRequest>,
) -> AppResult<(StatusCode, Json<DeceasedDetail>)> {
    let detail = DeceasedService::create(&state.db, &state.activity, &user, &body).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn list_deceased(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DeceasedQuery>,
) -> AppResult<Json<Paginated<Deceased>>> {
    DeceasedService::list(&state.db, &user, &query).await.map(Json)
}

pub async fn get_deceased(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DeceasedDetail>> {
    DeceasedService::get(&state.db, &user, id).await.map(Json)
}

pub async fn update_deceased(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateDeceasedRequest>,
) -> AppResult<Json<Deceased>> {
    DeceasedService::update(&state.db, &state.activity, &user, id, &body).await.map(Json)
}

/// PATCH /api/deceased/{id}/status
pub async fn set_deceased_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateDeceasedStatusRequest>,
) -> AppResult<Json<Deceased>> {
    DeceasedService::set_status(&state.db, &state.activity, &user, id, &body).await.map(Json)
}

pub async fn delete_deceased(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    DeceasedService::delete(&state.db, &state.activity, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_next_of_kin(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<NextOfKin>>> {
    DeceasedService::ensure_visible(&state.db, &user, id).await?;
    DeceasedService::list_kin(&state.db, id).await.map(Json)
}

pub async fn add_next_of_kin(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<NextOfKinInput>,
) -> AppResult<(StatusCode, Json<NextOfKin>)> {
    let kin = DeceasedService::add_kin(&state.db, &state.activity, &user, id, &body).await?;
    Ok((StatusCode::CREATED, Json(kin)))
}

pub async fn update_next_of_kin(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, kin_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateNextOfKinRequest>,
) -> AppResult<Json<NextOfKin>> {
    DeceasedService::update_kin(&state.db, &state.activity, &user, id, kin_id, &body)
        .await
        .map(Json)
}

pub async fn remove_next_of_kin(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((id, kin_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    DeceasedService::remove_kin(&state.db, &state.activity, &user, id, kin_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
