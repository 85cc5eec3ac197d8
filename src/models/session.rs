//! Attendance session model
//!
//! A session is a time-boxed window in which students check in by presenting
//! its QR payload. It starts active and is closed exactly once, either by an
//! administrator or by the expiry sweeper.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Attendance-taking window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: i64,
    /// Display name, e.g. "CS101 Lecture 4"
    pub name: String,
    /// Administrator who opened the session
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    /// Deadline after which check-ins are refused and absences are filled in
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    /// Calendar date label
    pub date: Option<NaiveDate>,
    /// Start time label
    pub time: Option<NaiveTime>,
    pub duration_minutes: Option<i32>,
    /// Opaque token encoded in the QR code
    pub qr_payload: Option<String>,
}

impl Session {
    /// True once `now` is strictly past the deadline.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Active and not yet past its deadline.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }
}

/// Input for opening a session
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionInput {
    pub name: String,
    /// Window length; `expires_at = now + duration_minutes`
    pub duration_minutes: i32,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<NaiveTime>,
}
