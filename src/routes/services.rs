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
        service::{CreateServiceRequest, Service, ServiceQuery, UpdateServiceRequest},
    },
    services::catalog::CatalogService,
    AppState,
};

/// Public. Admins may add `include_inactive=true`.
pub async fn list_services(
    State(state): State<AppState>,
    user: Option<AuthenticatedUser>,
    Query(query): Query<ServiceQuery>,
) -> AppResult<Json<Vec<Service>>> {
    CatalogService::list(&state.db, user.as_ref(), &query).await.map(Json)
}

pub async fn get_service(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Service>> {
    CatalogService::get(&state.db, id).await.map(Json)
}

pub async fn create_service(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateServiceRequest>,
) -> AppResult<(StatusCode, Json<Service>)> {
    let service = CatalogService::create(&state.db, &state.activity, &user, &body).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn update_service(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateServiceRequest>,
) -> AppResult<Json<Service>> {
    CatalogService::update(&state.db, &state.activity, &user, id, &body).await.map(Json)
}

pub async fn deactivate_service(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    CatalogService::deactivate(&state.db, &state.activity, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
