pub mod activity;
pub mod auth;
pub mod bookings;
pub mod catalog;
pub mod deceased;
pub mod documents;
pub mod feedback;
pub mod metrics;
pub mod mpesa;
pub mod payment_provider;
pub mod payments;
pub mod reports;
pub mod users;
