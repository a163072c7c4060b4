use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use bytes::Bytes;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        activity::ActivityEntry,
        auth::AuthenticatedUser,
        document::{Document, DocumentQuery, DocumentStatus, DocumentType, ReviewDocumentRequest},
        user::Permission,
        PageQuery, Paginated,
    },
    services::{activity::ActivityLogger, bookings::BookingService, deceased::DeceasedService, metrics},
};

pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "doc", "docx"];

/// Sub-directory of the upload root holding document files.
const DOCUMENTS_DIR: &str = "documents";

/// Column widths of `documents.name`/`original_filename` and `content_type`.
pub const MAX_NAME_LEN: usize = 255;
const MAX_CONTENT_TYPE_LEN: usize = 128;

const DOC_COLS: &str =
    "d.id, d.deceased_id, d.booking_id, d.name, d.description, d.original_filename, d.file_path,
     d.content_type, d.size_bytes, d.document_type, d.uploaded_by, d.status, d.review_notes,
     d.reviewed_by, d.reviewed_at, d.created_at, d.updated_at";

/// Fields collected from the multipart body before anything touches disk.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<(Bytes, String, String)>,
    pub document_type: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub booking_id: Option<String>,
    pub deceased_id: Option<String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" => {
                    let filename = field.file_name().unwrap_or("document").to_string();
                    let ct = field
                        .content_type()
                        .filter(|ct| ct.len() <= MAX_CONTENT_TYPE_LEN)
                        .map(str::to_string)
                        .unwrap_or_else(|| {
                            mime_guess::from_path(&filename).first_or_octet_stream().to_string()
                        });
                    let bytes = field.bytes().await?;
                    form.file = Some((bytes, filename, ct));
                }
                "document_type" => form.document_type = Some(field.text().await?),
                "name" => form.name = Some(field.text().await?),
                "description" => form.description = Some(field.text().await?),
                "booking_id" => form.booking_id = Some(field.text().await?),
                "deceased_id" => form.deceased_id = Some(field.text().await?),
                _ => {}
            }
        }
        Ok(form)
    }
}

/// Lower-cased extension when it is on the allow-list.
pub fn allowed_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

pub fn parse_document_type(raw: Option<&str>) -> AppResult<DocumentType> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::bad_request("document_type is required"))?;
    raw.parse()
        .map_err(|_| AppError::bad_request(format!("Invalid document type: {raw}")))
}

fn parse_optional_id(raw: Option<&str>, field: &str) -> AppResult<Option<Uuid>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| AppError::bad_request(format!("{field} is not a valid id"))),
    }
}

/// Size and file-type checks. Returns the extension to store the file under.
pub fn validate_file(filename: &str, size: usize, max_bytes: usize) -> AppResult<String> {
    if size == 0 {
        return Err(AppError::bad_request("Uploaded file is empty"));
    }
    if filename.chars().count() > MAX_NAME_LEN {
        return Err(AppError::bad_request(format!(
            "File name too long: maximum is {MAX_NAME_LEN} characters"
        )));
    }
    if size > max_bytes {
        return Err(AppError::bad_request(format!(
            "File too large: maximum size is {} MB",
            max_bytes / (1024 * 1024)
        )));
    }
    allowed_extension(filename).ok_or_else(|| {
        AppError::bad_request(format!(
            "Invalid file type: allowed types are {}",
            ALLOWED_EXTENSIONS.join(", ")
        ))
    })
}

/// Writes the file as `documents/<uuid>.<ext>` under `upload_dir` and
/// returns the path relative to `upload_dir`.
pub async fn store_file(upload_dir: &str, ext: &str, bytes: &[u8]) -> AppResult<String> {
    let dir = PathBuf::from(upload_dir).join(DOCUMENTS_DIR);
    tokio::fs::create_dir_all(&dir).await?;
    let filename = format!("{}.{}", Uuid::new_v4(), ext);
    tokio::fs::write(dir.join(&filename), bytes).await?;
    Ok(format!("{DOCUMENTS_DIR}/{filename}"))
}

/// Best-effort unlink. A missing file is not an error.
pub async fn remove_stored_file(upload_dir: &str, relative: &str) {
    let path = PathBuf::from(upload_dir).join(relative);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "failed to remove stored file: {e}"),
    }
}

pub struct DocumentService;

impl DocumentService {
    /// Validates, stores, then records the document. Any failure after the
    /// file is written removes it again.
    pub async fn upload(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        upload_dir: &str,
        max_bytes: usize,
        form: UploadForm,
    ) -> AppResult<Document> {
        let result = Self::upload_inner(pool, activity, requester, upload_dir, max_bytes, form).await;
        let outcome = if result.is_ok() { "accepted" } else { "rejected" };
        metrics::DOCUMENT_UPLOADS_COUNTER.with_label_values(&[outcome]).inc();
        result
    }

    async fn upload_inner(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        upload_dir: &str,
        max_bytes: usize,
        form: UploadForm,
    ) -> AppResult<Document> {
        let (bytes, original_filename, content_type) =
            form.file.ok_or_else(|| AppError::bad_request("No file uploaded"))?;
        let document_type = parse_document_type(form.document_type.as_deref())?;
        let ext = validate_file(&original_filename, bytes.len(), max_bytes)?;
        let booking_id = parse_optional_id(form.booking_id.as_deref(), "booking_id")?;
        let deceased_id = parse_optional_id(form.deceased_id.as_deref(), "deceased_id")?;

        let name = form
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| original_filename.clone());
        if name.chars().count() > MAX_NAME_LEN {
            return Err(AppError::bad_request(format!(
                "Document name too long: maximum is {MAX_NAME_LEN} characters"
            )));
        }

        let file_path = store_file(upload_dir, &ext, &bytes).await?;

        let recorded = async {
            if let Some(booking_id) = booking_id {
                let owner = BookingService::fetch_owner(pool, booking_id).await?;
                requester.authorize_owner_or(owner, Permission::ViewAllDocuments)?;
            }
            if let Some(deceased_id) = deceased_id {
                DeceasedService::ensure_visible(pool, requester, deceased_id).await?;
            }

            let doc = sqlx::query_as::<_, Document>(&format!(
                "INSERT INTO documents AS d
                    (deceased_id, booking_id, name, description, original_filename, file_path,
                     content_type, size_bytes, document_type, uploaded_by, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 RETURNING {DOC_COLS}"
            ))
            .bind(deceased_id)
            .bind(booking_id)
            .bind(&name)
            .bind(&form.description)
            .bind(&original_filename)
            .bind(&file_path)
            .bind(&content_type)
            .bind(bytes.len() as i64)
            .bind(document_type)
            .bind(requester.user_id)
            .bind(DocumentStatus::Pending)
            .fetch_one(pool)
            .await?;
            Ok::<_, AppError>(doc)
        }
        .await;

        match recorded {
            Ok(doc) => {
                tracing::info!(document_id = %doc.id, %document_type, size = doc.size_bytes, "document uploaded");
                activity.log(
                    ActivityEntry::new("document", "uploaded", format!("{document_type}: {}", doc.name))
                        .reference(doc.id)
                        .by(requester.user_id),
                );
                Ok(doc)
            }
            Err(e) => {
                remove_stored_file(upload_dir, &file_path).await;
                Err(e)
            }
        }
    }

    pub async fn list(
        pool: &PgPool,
        requester: &AuthenticatedUser,
        query: &DocumentQuery,
    ) -> AppResult<Paginated<Document>> {
        let page = PageQuery::new(query.page, query.limit);
        let viewer = (!requester.can(Permission::ViewAllDocuments)).then_some(requester.user_id);

        let filter = "($1::uuid IS NULL
                         OR d.uploaded_by = $1
                         OR d.booking_id IN (SELECT id FROM bookings WHERE user_id = $1))
                      AND ($2::text IS NULL OR d.status = $2)
                      AND ($3::text IS NULL OR d.document_type = $3)
                      AND ($4::uuid IS NULL OR d.booking_id = $4)
                      AND ($5::uuid IS NULL OR d.deceased_id = $5)";

        let rows = sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOC_COLS} FROM documents d
             WHERE {filter}
             ORDER BY d.created_at DESC
             LIMIT $6 OFFSET $7"
        ))
        .bind(viewer)
        .bind(query.status)
        .bind(query.document_type)
        .bind(query.booking_id)
        .bind(query.deceased_id)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM documents d WHERE {filter}"))
            .bind(viewer)
            .bind(query.status)
            .bind(query.document_type)
            .bind(query.booking_id)
            .bind(query.deceased_id)
            .fetch_one(pool)
            .await?;

        Ok(Paginated::new(rows, total, page))
    }

    async fn fetch(pool: &PgPool, id: Uuid) -> AppResult<Document> {
        sqlx::query_as::<_, Document>(&format!("SELECT {DOC_COLS} FROM documents d WHERE d.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Document not found"))
    }

    /// Admin, uploader, or owner of the referenced booking.
    pub async fn get(pool: &PgPool, requester: &AuthenticatedUser, id: Uuid) -> AppResult<Document> {
        let doc = Self::fetch(pool, id).await?;
        if requester.can(Permission::ViewAllDocuments) || doc.uploaded_by == Some(requester.user_id) {
            return Ok(doc);
        }
        if let Some(booking_id) = doc.booking_id {
            if BookingService::fetch_owner(pool, booking_id).await? == Some(requester.user_id) {
                return Ok(doc);
            }
        }
        Err(AppError::forbidden("You do not have access to this document"))
    }

    /// Returns the row and the file contents. NotFound when the row exists
    /// but the file is gone from disk.
    pub async fn download(
        pool: &PgPool,
        requester: &AuthenticatedUser,
        upload_dir: &str,
        id: Uuid,
    ) -> AppResult<(Document, Vec<u8>)> {
        let doc = Self::get(pool, requester, id).await?;
        let path = PathBuf::from(upload_dir).join(&doc.file_path);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok((doc, bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(document_id = %doc.id, path = %path.display(), "document file missing from storage");
                Err(AppError::not_found("Document file not found"))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Only pending documents can be reviewed; approved and rejected are final.
    pub async fn review(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        id: Uuid,
        req: &ReviewDocumentRequest,
    ) -> AppResult<Document> {
        requester.authorize(Permission::ReviewDocuments)?;
        if req.status == DocumentStatus::Pending {
            return Err(AppError::bad_request("Review status must be approved or rejected"));
        }

        let current = Self::fetch(pool, id).await?;
        if current.status != DocumentStatus::Pending {
            return Err(AppError::bad_request(format!(
                "Document has already been {}",
                current.status
            )));
        }

        let doc = sqlx::query_as::<_, Document>(&format!(
            "UPDATE documents d
             SET status = $1, review_notes = $2, reviewed_by = $3, reviewed_at = NOW(), updated_at = NOW()
             WHERE d.id = $4 AND d.status = $5
             RETURNING {DOC_COLS}"
        ))
        .bind(req.status)
        .bind(&req.notes)
        .bind(requester.user_id)
        .bind(id)
        .bind(DocumentStatus::Pending)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::bad_request("Document has already been reviewed"))?;

        tracing::info!(document_id = %id, status = %req.status, "document reviewed");
        activity.log(
            ActivityEntry::new("document", "reviewed", format!("status -> {}", req.status))
                .reference(id)
                .by(requester.user_id),
        );
        Ok(doc)
    }

    /// Admin or uploader. The file goes first, then the row.
    pub async fn delete(
        pool: &PgPool,
        activity: &ActivityLogger,
        requester: &AuthenticatedUser,
        upload_dir: &str,
        id: Uuid,
    ) -> AppResult<()> {
        let doc = Self::fetch(pool, id).await?;
        requester.authorize_owner_or(doc.uploaded_by, Permission::ViewAllDocuments)?;

        remove_stored_file(upload_dir, &doc.file_path).await;

        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        activity.log(
            ActivityEntry::new("document", "deleted", doc.name).reference(id).by(requester.user_id),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    #[test]
    fn extension_allow_list_is_case_insensitive() {
        assert_eq!(allowed_extension("cert.PDF").as_deref(), Some("pdf"));
        assert_eq!(allowed_extension("scan.jpeg").as_deref(), Some("jpeg"));
        assert!(allowed_extension("setup.exe").is_none());
        assert!(allowed_extension("no_extension").is_none());
        assert!(allowed_extension("archive.pdf.zip").is_none());
    }

    #[test]
    fn oversized_file_names_the_limit() {
        let err = validate_file("big.pdf", 5 * MB + 1, 5 * MB).unwrap_err();
        assert!(err.to_string().contains("5 MB"), "{err}");
        assert!(validate_file("ok.pdf", 5 * MB, 5 * MB).is_ok());
    }

    #[test]
    fn disallowed_type_names_the_allow_list() {
        let err = validate_file("virus.exe", 10, 5 * MB).unwrap_err();
        assert!(err.to_string().contains("Invalid file type"), "{err}");
        assert!(validate_file("empty.pdf", 0, 5 * MB).is_err());
    }

    #[test]
    fn long_file_name_is_rejected() {
        let long = format!("{}.pdf", "a".repeat(300));
        let err = validate_file(&long, 10, 5 * MB).unwrap_err();
        assert!(err.to_string().contains("File name too long"), "{err}");
        let fits = format!("{}.pdf", "a".repeat(MAX_NAME_LEN - 4));
        assert!(validate_file(&fits, 10, 5 * MB).is_ok());
    }

    #[test]
    fn document_type_must_be_known() {
        assert_eq!(parse_document_type(Some("burial_permit")).unwrap(), DocumentType::BurialPermit);
        assert!(parse_document_type(Some("passport")).is_err());
        assert!(parse_document_type(None).is_err());
    }

    #[test]
    fn blank_ids_are_treated_as_absent() {
        assert_eq!(parse_optional_id(Some("  "), "booking_id").unwrap(), None);
        assert!(parse_optional_id(Some("nope"), "booking_id").is_err());
    }

    #[tokio::test]
    async fn stored_file_can_be_removed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();

        let rel = store_file(root, "pdf", b"%PDF-1.4").await.unwrap();
        assert!(rel.starts_with("documents/") && rel.ends_with(".pdf"));
        assert!(dir.path().join(&rel).exists());

        remove_stored_file(root, &rel).await;
        assert!(!dir.path().join(&rel).exists());

        // Second removal hits a missing file and is ignored.
        remove_stored_file(root, &rel).await;
    }
}
