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
        feedback::{CreateFeedbackRequest, Feedback, FeedbackQuery, PublicFeedback},
        Paginated,
    },
    services::feedback::FeedbackService,
    AppState,
};

pub async fn submit_feedback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateFeedbackRequest>,
) -> AppResult<(StatusCode, Json<Feedback>)> {
    let feedback = FeedbackService::submit(&state.db, &state.activity, &user, &body).await?;
    Ok((StatusCode::CREATED, Json(feedback)))
}

pub async fn list_public_feedback(
    State(state): State<AppState>,
    Query(query): Query<FeedbackQuery>,
) -> AppResult<Json<Paginated<PublicFeedback>>> {
    FeedbackService::list_public(&state.db, &query).await.map(Json)
}

pub async fn list_feedback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<FeedbackQuery>,
) -> AppResult<Json<Paginated<Feedback>>> {
    FeedbackService::list(&state.db, &user, &query).await.map(Json)
}

pub async fn delete_feedback(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    FeedbackService::delete(&state.db, &state.activity, &user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
