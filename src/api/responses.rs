//! Shared API response types
//!
//! Response structures used across several endpoints. Timestamps are
//! rendered as RFC 3339 strings.

use serde::{Deserialize, Serialize};

use crate::models::{Attendance, AttendanceSummary, Session, User};

// ============================================================================
// User Response Types
// ============================================================================

/// Public view of an account (never includes the password hash)
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub status: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            name: user.name,
            email: user.email,
            role: user.role.to_string(),
            status: user.status.to_string(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Response for login and setup
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Paginated user list
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedUsersResponse {
    pub users: Vec<UserResponse>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

// ============================================================================
// Session Response Types
// ============================================================================

/// Session as shown to administrators, including the QR payload
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: i64,
    pub name: String,
    pub created_by: i64,
    pub created_at: String,
    pub expires_at: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_payload: Option<String>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            name: session.name,
            created_by: session.created_by,
            created_at: session.created_at.to_rfc3339(),
            expires_at: session.expires_at.to_rfc3339(),
            is_active: session.is_active,
            date: session.date.map(|d| d.to_string()),
            time: session.time.map(|t| t.format("%H:%M").to_string()),
            duration_minutes: session.duration_minutes,
            qr_payload: session.qr_payload,
        }
    }
}

impl SessionResponse {
    /// Same view with the QR payload removed, for non-administrators
    pub fn without_payload(session: Session) -> Self {
        Self {
            qr_payload: None,
            ..Self::from(session)
        }
    }
}

// ============================================================================
// Attendance Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct AttendanceResponse {
    pub id: i64,
    pub user_id: i64,
    pub session_id: i64,
    pub user_name: String,
    pub check_in_time: String,
    pub status: String,
}

impl From<Attendance> for AttendanceResponse {
    fn from(record: Attendance) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            session_id: record.session_id,
            user_name: record.user_name,
            check_in_time: record.check_in_time.to_rfc3339(),
            status: record.status.to_string(),
        }
    }
}

/// A session's records with tallies
#[derive(Debug, Serialize)]
pub struct SessionAttendanceResponse {
    pub session: SessionResponse,
    pub records: Vec<AttendanceResponse>,
    pub summary: AttendanceSummary,
}
