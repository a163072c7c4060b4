//! Database-backed workflow scenarios.
//!
//! Run with: DATABASE_URL=postgres://... cargo test --test workflow -- --ignored

use bytes::Bytes;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use funeral_home_api::{
    db,
    error::AppError,
    models::{
        auth::AuthenticatedUser,
        booking::{BookingQuery, BookingStatus, CreateBookingRequest, PaymentStatus},
        deceased::CreateDeceasedRequest,
        feedback::CreateFeedbackRequest,
        payment::{InitiatePaymentRequest, PaymentRecordStatus},
        service::{CreateServiceRequest, Service},
        user::{CreateStaffRequest, RegisterRequest, User, UserRole},
    },
    services::{
        activity::ActivityLogger,
        auth::AuthService,
        bookings::BookingService,
        catalog::CatalogService,
        deceased::DeceasedService,
        documents::{DocumentService, UploadForm},
        feedback::FeedbackService,
        payment_provider::SimulatedMobileMoney,
        payments::PaymentService,
    },
};

struct Ctx {
    pool: PgPool,
    activity: ActivityLogger,
    uploads: tempfile::TempDir,
}

async fn ctx() -> Ctx {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for workflow tests");
    let pool = db::create_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    Ctx {
        activity: ActivityLogger::postgres(pool.clone()),
        pool,
        uploads: tempfile::tempdir().unwrap(),
    }
}

fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4().simple())
}

fn as_requester(user: &User) -> AuthenticatedUser {
    AuthenticatedUser { user_id: user.id, email: user.email.clone(), role: user.role }
}

async fn user(ctx: &Ctx, role: UserRole) -> AuthenticatedUser {
    let created = AuthService::insert_user(
        &ctx.pool,
        "Workflow User",
        &unique_email(role.as_str()),
        "secret1",
        role,
        None,
        None,
    )
    .await
    .unwrap();
    as_requester(&created)
}

async fn service(ctx: &Ctx, admin: &AuthenticatedUser, price: i64) -> Service {
    let req: CreateServiceRequest = serde_json::from_value(json!({
        "name": format!("Service {}", Uuid::new_v4().simple()),
        "price": price.to_string(),
        "category": "ceremony",
    }))
    .unwrap();
    CatalogService::create(&ctx.pool, &ctx.activity, admin, &req).await.unwrap()
}

async fn deceased(ctx: &Ctx, owner: &AuthenticatedUser) -> Uuid {
    let req: CreateDeceasedRequest = serde_json::from_value(json!({
        "first_name": "John",
        "last_name": "Doe",
        "date_of_death": "2026-10-01",
        "next_of_kin": [
            { "name": "Jane Doe", "relationship": "spouse", "phone": "0712345678", "is_primary": true }
        ],
    }))
    .unwrap();
    DeceasedService::create(&ctx.pool, &ctx.activity, owner, &req)
        .await
        .unwrap()
        .deceased
        .id
}

async fn booking(ctx: &Ctx, client: &AuthenticatedUser, lines: &[(Uuid, i32)]) -> Uuid {
    let deceased_id = deceased(ctx, client).await;
    let req: CreateBookingRequest = serde_json::from_value(json!({
        "deceased_id": deceased_id,
        "services": lines
            .iter()
            .map(|(id, qty)| json!({ "service_id": id, "quantity": qty }))
            .collect::<Vec<_>>(),
    }))
    .unwrap();
    BookingService::create(&ctx.pool, &ctx.activity, client, &req)
        .await
        .unwrap()
        .summary
        .booking
        .id
}

#[tokio::test]
#[ignore]
async fn duplicate_registration_any_case_conflicts() {
    let ctx = ctx().await;
    let email = unique_email("a");
    let register = |email: String| RegisterRequest {
        name: "A".into(),
        email,
        password: "secret1".into(),
        phone: None,
        address: None,
    };

    let first = AuthService::register(&ctx.pool, &ctx.activity, &register(email.clone())).await.unwrap();
    assert_eq!(first.role, UserRole::Client);

    let err = AuthService::register(&ctx.pool, &ctx.activity, &register(email.to_uppercase()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "{err:?}");
}

#[tokio::test]
#[ignore]
async fn booking_total_is_frozen_at_creation() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let client = user(&ctx, UserRole::Client).await;
    let a = service(&ctx, &admin, 100).await;
    let b = service(&ctx, &admin, 50).await;

    let id = booking(&ctx, &client, &[(a.id, 2), (b.id, 1)]).await;
    let detail = BookingService::get(&ctx.pool, &client, id).await.unwrap();
    assert_eq!(detail.summary.booking.total_amount, Decimal::new(250, 0));
    assert_eq!(detail.services.len(), 2);
    assert_eq!(detail.summary.booking.status, BookingStatus::Pending);

    // A later price change leaves the booking alone.
    let update = serde_json::from_value(json!({ "price": "999" })).unwrap();
    CatalogService::update(&ctx.pool, &ctx.activity, &admin, a.id, &update).await.unwrap();
    let detail = BookingService::get(&ctx.pool, &client, id).await.unwrap();
    assert_eq!(detail.summary.booking.total_amount, Decimal::new(250, 0));
}

#[tokio::test]
#[ignore]
async fn inactive_service_is_rejected_by_id() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let client = user(&ctx, UserRole::Client).await;
    let svc = service(&ctx, &admin, 10).await;
    CatalogService::deactivate(&ctx.pool, &ctx.activity, &admin, svc.id).await.unwrap();

    let deceased_id = deceased(&ctx, &client).await;
    let req: CreateBookingRequest = serde_json::from_value(json!({
        "deceased_id": deceased_id,
        "services": [{ "service_id": svc.id }],
    }))
    .unwrap();
    let err = BookingService::create(&ctx.pool, &ctx.activity, &client, &req).await.unwrap_err();
    assert!(matches!(&err, AppError::BadRequest(m) if m.contains(&svc.id.to_string())), "{err:?}");

    // Nothing was left behind by the rolled-back transaction.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE deceased_id = $1")
        .bind(deceased_id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[ignore]
async fn admin_may_jump_straight_to_completed() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let client = user(&ctx, UserRole::Client).await;
    let svc = service(&ctx, &admin, 10).await;
    let id = booking(&ctx, &client, &[(svc.id, 1)]).await;

    let updated = BookingService::set_status(&ctx.pool, &ctx.activity, &admin, id, BookingStatus::Completed)
        .await
        .unwrap();
    assert_eq!(updated.status, BookingStatus::Completed);

    let err = BookingService::set_status(&ctx.pool, &ctx.activity, &client, id, BookingStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
#[ignore]
async fn clients_only_list_their_own_bookings() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let alice = user(&ctx, UserRole::Client).await;
    let bob = user(&ctx, UserRole::Client).await;
    let attendant = user(&ctx, UserRole::MorgueAttendant).await;
    let svc = service(&ctx, &admin, 10).await;
    booking(&ctx, &alice, &[(svc.id, 1)]).await;
    let bobs = booking(&ctx, &bob, &[(svc.id, 1)]).await;

    let query = BookingQuery { status: None, payment_status: None, page: None, limit: Some(100) };
    for requester in [&alice, &attendant] {
        let page = BookingService::list(&ctx.pool, requester, &query).await.unwrap();
        assert!(page.data.iter().all(|b| b.booking.user_id == Some(requester.user_id)));
    }

    let err = BookingService::get(&ctx.pool, &alice, bobs).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
#[ignore]
async fn simulated_payment_goes_partial_then_paid_idempotently() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let client = user(&ctx, UserRole::Client).await;
    let svc = service(&ctx, &admin, 300).await;
    let id = booking(&ctx, &client, &[(svc.id, 1)]).await;
    let provider = SimulatedMobileMoney;

    let pending = PaymentService::list_pending(&ctx.pool, &client).await.unwrap();
    assert!(pending.iter().any(|b| b.summary.booking.id == id));

    let req = InitiatePaymentRequest { booking_id: id, amount: Decimal::new(300, 0), phone: "0712345678".into() };
    let started = PaymentService::initiate(&ctx.pool, &ctx.activity, &provider, &client, &req).await.unwrap();
    assert_eq!(started.status, PaymentRecordStatus::Processing);
    let detail = BookingService::get(&ctx.pool, &client, id).await.unwrap();
    assert_eq!(detail.summary.booking.payment_status, PaymentStatus::Partial);

    // Only the booking owner verifies; staff included, everyone else is refused.
    let stranger = user(&ctx, UserRole::Client).await;
    for other in [&stranger, &admin] {
        let err = PaymentService::verify(&ctx.pool, &ctx.activity, &provider, other, &started.transaction_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");
    }

    for _ in 0..2 {
        let verified =
            PaymentService::verify(&ctx.pool, &ctx.activity, &provider, &client, &started.transaction_id)
                .await
                .unwrap();
        assert_eq!(verified.status, PaymentRecordStatus::Completed);
    }
    let detail = BookingService::get(&ctx.pool, &client, id).await.unwrap();
    assert_eq!(detail.summary.booking.payment_status, PaymentStatus::Paid);

    // Paid bookings are no longer payable, and recorded payments block deletion.
    let err = PaymentService::initiate(&ctx.pool, &ctx.activity, &provider, &client, &req).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = BookingService::delete(&ctx.pool, &ctx.activity, &admin, id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[ignore]
async fn deleting_booking_cascades_lines_and_orphans_documents() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let client = user(&ctx, UserRole::Client).await;
    let svc = service(&ctx, &admin, 10).await;
    let id = booking(&ctx, &client, &[(svc.id, 3)]).await;

    let form = UploadForm {
        file: Some((Bytes::from_static(b"%PDF-1.4"), "contract.pdf".into(), "application/pdf".into())),
        document_type: Some("contract".into()),
        booking_id: Some(id.to_string()),
        ..Default::default()
    };
    let uploads = ctx.uploads.path().to_str().unwrap();
    let doc = DocumentService::upload(&ctx.pool, &ctx.activity, &client, uploads, 5 * 1024 * 1024, form)
        .await
        .unwrap();

    BookingService::delete(&ctx.pool, &ctx.activity, &admin, id).await.unwrap();

    let lines: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM booking_services WHERE booking_id = $1")
        .bind(id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(lines, 0);

    let kept = DocumentService::get(&ctx.pool, &admin, doc.id).await.unwrap();
    assert_eq!(kept.booking_id, None);
}

#[tokio::test]
#[ignore]
async fn upload_to_someone_elses_booking_leaves_no_file() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let owner = user(&ctx, UserRole::Client).await;
    let intruder = user(&ctx, UserRole::Client).await;
    let svc = service(&ctx, &admin, 10).await;
    let id = booking(&ctx, &owner, &[(svc.id, 1)]).await;

    let form = UploadForm {
        file: Some((Bytes::from_static(b"\x89PNG"), "scan.png".into(), "image/png".into())),
        document_type: Some("other".into()),
        booking_id: Some(id.to_string()),
        ..Default::default()
    };
    let uploads = ctx.uploads.path().to_str().unwrap();
    let err = DocumentService::upload(&ctx.pool, &ctx.activity, &intruder, uploads, 5 * 1024 * 1024, form)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let leftover = std::fs::read_dir(ctx.uploads.path().join("documents"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[tokio::test]
#[ignore]
async fn reviewed_documents_are_final() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let client = user(&ctx, UserRole::Client).await;

    let form = UploadForm {
        file: Some((Bytes::from_static(b"%PDF-1.4"), "permit.pdf".into(), "application/pdf".into())),
        document_type: Some("burial_permit".into()),
        ..Default::default()
    };
    let uploads = ctx.uploads.path().to_str().unwrap();
    let doc = DocumentService::upload(&ctx.pool, &ctx.activity, &client, uploads, 5 * 1024 * 1024, form)
        .await
        .unwrap();

    let approve = serde_json::from_value(json!({ "status": "approved", "notes": "ok" })).unwrap();
    let reviewed = DocumentService::review(&ctx.pool, &ctx.activity, &admin, doc.id, &approve).await.unwrap();
    assert_eq!(reviewed.reviewed_by, Some(admin.user_id));

    let reject = serde_json::from_value(json!({ "status": "rejected" })).unwrap();
    let err = DocumentService::review(&ctx.pool, &ctx.activity, &admin, doc.id, &reject).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Row still there, file gone: download reports NotFound.
    std::fs::remove_file(ctx.uploads.path().join(&doc.file_path)).unwrap();
    let err = DocumentService::download(&ctx.pool, &client, uploads, doc.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
#[ignore]
async fn client_books_for_a_body_registered_by_the_morgue() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let attendant = user(&ctx, UserRole::MorgueAttendant).await;
    let client = user(&ctx, UserRole::Client).await;
    let svc = service(&ctx, &admin, 80).await;
    let deceased_id = deceased(&ctx, &attendant).await;

    let req: CreateBookingRequest = serde_json::from_value(json!({
        "deceased_id": deceased_id,
        "services": [{ "service_id": svc.id, "quantity": 1 }],
    }))
    .unwrap();
    let detail = BookingService::create(&ctx.pool, &ctx.activity, &client, &req).await.unwrap();
    assert_eq!(detail.summary.booking.user_id, Some(client.user_id));
    assert_eq!(detail.summary.booking.total_amount, Decimal::new(80, 0));

    // Once booked, the client can see the record too.
    DeceasedService::get(&ctx.pool, &client, deceased_id).await.unwrap();

    let missing: CreateBookingRequest = serde_json::from_value(json!({
        "deceased_id": Uuid::new_v4(),
        "services": [{ "service_id": svc.id }],
    }))
    .unwrap();
    let err = BookingService::create(&ctx.pool, &ctx.activity, &client, &missing).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "{err:?}");
}

#[tokio::test]
#[ignore]
async fn out_of_range_input_is_a_client_error() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let client = user(&ctx, UserRole::Client).await;
    let svc = service(&ctx, &admin, 100).await;
    let deceased_id = deceased(&ctx, &client).await;

    let req: CreateBookingRequest = serde_json::from_value(json!({
        "deceased_id": deceased_id,
        "services": [{ "service_id": svc.id, "quantity": 2_000_000_000 }],
    }))
    .unwrap();
    let err = BookingService::create(&ctx.pool, &ctx.activity, &client, &req).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }), "{err:?}");

    // Column overflows that slip past validation still map to 400.
    let err: AppError = sqlx::query("SELECT 1e20::NUMERIC(12, 2)")
        .execute(&ctx.pool)
        .await
        .unwrap_err()
        .into();
    assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");

    let mut tx = ctx.pool.begin().await.unwrap();
    sqlx::query("CREATE TEMP TABLE short_text (v VARCHAR(3)) ON COMMIT DROP")
        .execute(&mut *tx)
        .await
        .unwrap();
    let err: AppError = sqlx::query("INSERT INTO short_text (v) VALUES ('toolong')")
        .execute(&mut *tx)
        .await
        .unwrap_err()
        .into();
    assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");
}

#[tokio::test]
#[ignore]
async fn only_admins_create_staff_and_never_clients() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let client = user(&ctx, UserRole::Client).await;
    let staff = |role: UserRole| CreateStaffRequest {
        name: "Staff".into(),
        email: unique_email("staff"),
        password: "secret1".into(),
        role,
        phone: None,
        address: None,
    };

    let err = AuthService::create_staff_user(&ctx.pool, &ctx.activity, &client, &staff(UserRole::Admin))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");

    let err = AuthService::create_staff_user(&ctx.pool, &ctx.activity, &admin, &staff(UserRole::Client))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");

    let created =
        AuthService::create_staff_user(&ctx.pool, &ctx.activity, &admin, &staff(UserRole::MorgueAttendant))
            .await
            .unwrap();
    assert_eq!(created.role, UserRole::MorgueAttendant);
}

#[tokio::test]
#[ignore]
async fn only_owner_cancels_and_only_while_pending() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let owner = user(&ctx, UserRole::Client).await;
    let other = user(&ctx, UserRole::Client).await;
    let svc = service(&ctx, &admin, 10).await;

    let id = booking(&ctx, &owner, &[(svc.id, 1)]).await;
    let err = BookingService::cancel(&ctx.pool, &ctx.activity, &other, id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");
    let cancelled = BookingService::cancel(&ctx.pool, &ctx.activity, &owner, id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let confirmed = booking(&ctx, &owner, &[(svc.id, 1)]).await;
    BookingService::set_status(&ctx.pool, &ctx.activity, &admin, confirmed, BookingStatus::Confirmed)
        .await
        .unwrap();
    let err = BookingService::cancel(&ctx.pool, &ctx.activity, &owner, confirmed).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");
}

#[tokio::test]
#[ignore]
async fn second_feedback_for_a_booking_conflicts() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let client = user(&ctx, UserRole::Client).await;
    let svc = service(&ctx, &admin, 10).await;
    let id = booking(&ctx, &client, &[(svc.id, 1)]).await;

    let req: CreateFeedbackRequest = serde_json::from_value(json!({
        "booking_id": id,
        "rating": 5,
        "comment": "Dignified and calm",
        "is_public": true,
    }))
    .unwrap();
    FeedbackService::submit(&ctx.pool, &ctx.activity, &client, &req).await.unwrap();
    let err = FeedbackService::submit(&ctx.pool, &ctx.activity, &client, &req).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "{err:?}");

    let stranger = user(&ctx, UserRole::Client).await;
    let err = FeedbackService::submit(&ctx.pool, &ctx.activity, &stranger, &req).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");
}

#[tokio::test]
#[ignore]
async fn document_delete_removes_file_then_row() {
    let ctx = ctx().await;
    let admin = user(&ctx, UserRole::Admin).await;
    let uploader = user(&ctx, UserRole::Client).await;
    let other = user(&ctx, UserRole::Client).await;
    let uploads = ctx.uploads.path().to_str().unwrap();

    let upload = |name: &'static str| UploadForm {
        file: Some((Bytes::from_static(b"%PDF-1.4"), name.into(), "application/pdf".into())),
        document_type: Some("receipt".into()),
        ..Default::default()
    };

    let mine = DocumentService::upload(&ctx.pool, &ctx.activity, &uploader, uploads, 5 * 1024 * 1024, upload("a.pdf"))
        .await
        .unwrap();
    let err = DocumentService::delete(&ctx.pool, &ctx.activity, &other, uploads, mine.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "{err:?}");

    DocumentService::delete(&ctx.pool, &ctx.activity, &uploader, uploads, mine.id).await.unwrap();
    assert!(!ctx.uploads.path().join(&mine.file_path).exists());
    let err = DocumentService::get(&ctx.pool, &admin, mine.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // A file already gone from disk does not block removing the row.
    let drifted = DocumentService::upload(&ctx.pool, &ctx.activity, &uploader, uploads, 5 * 1024 * 1024, upload("b.pdf"))
        .await
        .unwrap();
    std::fs::remove_file(ctx.uploads.path().join(&drifted.file_path)).unwrap();
    DocumentService::delete(&ctx.pool, &ctx.activity, &admin, uploads, drifted.id).await.unwrap();
    let err = DocumentService::get(&ctx.pool, &admin, drifted.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
