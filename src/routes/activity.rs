use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{
        activity::{ActivityLog, ActivityQuery},
        auth::AuthenticatedUser,
        user::Permission,
        Paginated,
    },
    services::activity::ActivityService,
    AppState,
};

pub async fn list_activity(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<Paginated<ActivityLog>>> {
    user.authorize(Permission::ViewActivity)?;
    ActivityService::list(&state.db, &query).await.map(Json)
}
