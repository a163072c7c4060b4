pub mod activity;
pub mod auth;
pub mod bookings;
pub mod deceased;
pub mod documents;
pub mod feedback;
pub mod health;
pub mod metrics;
pub mod payments;
pub mod services;
pub mod users;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, patch, post, put},
    Extension, Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{middleware::auth::JwtSecret, AppState};

fn cors(origin: Option<&str>) -> CorsLayer {
    let allow_origin = match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(value) => AllowOrigin::exact(value),
        None => AllowOrigin::any(),
    };
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(allow_origin)
}

pub fn router(state: AppState) -> Router {
    let jwt_secret = JwtSecret(state.config.jwt_secret.clone());
    // Multipart framing on top of the largest accepted file.
    let body_limit = state.config.max_upload_bytes * 2;
    let cors = cors(state.config.cors_origin.as_deref());

    let api = Router::new()
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/change-password", post(auth::change_password))
        .route("/auth/staff", post(auth::create_staff))
        // Users
        .route("/users", get(users::list_users))
        .route("/users/{id}", get(users::get_user).put(users::update_user).delete(users::delete_user))
        // Service catalog
        .route("/services", get(services::list_services).post(services::create_service))
        .route(
            "/services/{id}",
            get(services::get_service).put(services::update_service).delete(services::deactivate_service),
        )
        // Deceased & next of kin
        .route("/deceased", get(deceased::list_deceased).post(deceased::create_deceased))
        .route(
            "/deceased/{id}",
            get(deceased::get_deceased).put(deceased::update_deceased).delete(deceased::delete_deceased),
        )
        .route("/deceased/{id}/status", patch(deceased::set_deceased_status))
        .route(
            "/deceased/{id}/next-of-kin",
            get(deceased::list_next_of_kin).post(deceased::add_next_of_kin),
        )
        .route(
            "/deceased/{id}/next-of-kin/{kin_id}",
            put(deceased::update_next_of_kin).delete(deceased::remove_next_of_kin),
        )
        // Bookings
        .route("/bookings", get(bookings::list_bookings).post(bookings::create_booking))
        .route("/bookings/{id}", get(bookings::get_booking).delete(bookings::delete_booking))
        .route("/bookings/{id}/status", patch(bookings::set_booking_status))
        .route("/bookings/{id}/payment-status", patch(bookings::set_payment_status))
        .route("/bookings/{id}/cancel", post(bookings::cancel_booking))
        .route("/bookings/{id}/services/{line_id}/status", patch(bookings::set_line_item_status))
        // Documents
        .route("/documents", get(documents::list_documents).post(documents::upload_document))
        .route("/documents/{id}", get(documents::get_document).delete(documents::delete_document))
        .route("/documents/{id}/download", get(documents::download_document))
        .route("/documents/{id}/review", patch(documents::review_document))
        // Payments
        .route("/payments", get(payments::list_payments))
        .route("/payments/pending", get(payments::list_pending))
        .route("/payments/initiate", post(payments::initiate_payment))
        .route("/payments/verify/{transaction_id}", get(payments::verify_payment))
        .route("/payments/report", get(payments::generate_report))
        .route("/payments/mpesa/stk-push", post(payments::mpesa_stk_push))
        .route("/payments/mpesa/query/{checkout_request_id}", get(payments::mpesa_query))
        .route("/payments/mpesa/callback", post(payments::mpesa_callback))
        // Feedback
        .route("/feedback", get(feedback::list_feedback).post(feedback::submit_feedback))
        .route("/feedback/public", get(feedback::list_public_feedback))
        .route("/feedback/{id}", delete(feedback::delete_feedback))
        // Activity log
        .route("/activity", get(activity::list_activity));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .nest("/api", api)
        .layer(Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
