use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        auth::AuthenticatedUser,
        document::{Document, DocumentQuery, ReviewDocumentRequest},
        Paginated,
    },
    services::documents::{DocumentService, UploadForm},
    AppState,
};

/// Multipart: `file`, `document_type`, optional `name`, `description`,
/// `booking_id`, `deceased_id`.
pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Document>)> {
    let form = UploadForm::read(multipart).await?;
    let doc = DocumentService::upload(
        &state.db,
        &state.activity,
        &user,
        &state.config.upload_dir,
        state.config.max_upload_bytes,
        form,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DocumentQuery>,
) -> AppResult<Json<Paginated<Document>>> {
    DocumentService::list(&state.db, &user, &query).await.map(Json)
}

pub async fn get_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Document>> {
    DocumentService::get(&state.db, &user, id).await.map(Json)
}

pub async fn download_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let (doc, bytes) =
        DocumentService::download(&state.db, &user, &state.config.upload_dir, id).await?;

    let filename = doc.original_filename.replace('"', "");
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, doc.content_type)
        .header(header::CONTENT_LENGTH, bytes.len())
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\""))
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(e.into()))
}

/// PATCH /api/documents/{id}/review (admin)
pub async fn review_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewDocumentRequest>,
) -> AppResult<Json<Document>> {
    DocumentService::review(&state.db, &state.activity, &user, id, &body).await.map(Json)
}

pub async fn delete_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    DocumentService::delete(&state.db, &state.activity, &user, &state.config.upload_dir, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
