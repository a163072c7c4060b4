use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;

text_enum! {
    pub enum UserRole as "role" {
        Client => "client",
        Admin => "admin",
        MorgueAttendant => "morgue_attendant",
    }
}

/// Actions gated by role. Every check in the API goes through
/// [`UserRole::allows`], so adding a role forces a decision for each action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ManageUsers,
    ManageServices,
    ViewAllBookings,
    UpdateBookingStatus,
    UpdatePaymentStatus,
    DeleteBookings,
    ManageDeceased,
    DeleteDeceased,
    ViewAllDocuments,
    ReviewDocuments,
    ViewAllPayments,
    GenerateReports,
    ModerateFeedback,
    ViewActivity,
}

impl UserRole {
    pub fn allows(self, permission: Permission) -> bool {
        use Permission::*;
        match self {
            UserRole::Admin => true,
            UserRole::MorgueAttendant => matches!(permission, UpdateBookingStatus | ManageDeceased),
            UserRole::Client => false,
        }
    }

    pub fn is_staff(self) -> bool {
        match self {
            UserRole::Admin | UserRole::MorgueAttendant => true,
            UserRole::Client => false,
        }
    }
}

/// DB row struct.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateStaffRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Admin only.
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub role: Option<UserRole>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_holds_every_permission() {
        use Permission::*;
        for p in [
            ManageUsers, ManageServices, ViewAllBookings, UpdateBookingStatus,
            UpdatePaymentStatus, DeleteBookings, ManageDeceased, DeleteDeceased,
            ViewAllDocuments, ReviewDocuments, ViewAllPayments, GenerateReports,
            ModerateFeedback, ViewActivity,
        ] {
            assert!(UserRole::Admin.allows(p), "{p:?}");
            assert!(!UserRole::Client.allows(p), "{p:?}");
        }
    }

    #[test]
    fn morgue_attendant_can_move_bookings_but_not_money() {
        let role = UserRole::MorgueAttendant;
        assert!(role.allows(Permission::UpdateBookingStatus));
        assert!(role.allows(Permission::ManageDeceased));
        assert!(!role.allows(Permission::ViewAllBookings));
        assert!(!role.allows(Permission::UpdatePaymentStatus));
        assert!(!role.allows(Permission::ReviewDocuments));
        assert!(!role.allows(Permission::GenerateReports));
    }

    #[test]
    fn roles_round_trip_through_text() {
        assert_eq!("morgue_attendant".parse::<UserRole>().unwrap(), UserRole::MorgueAttendant);
        assert!("super_admin".parse::<UserRole>().is_err());
    }
}
