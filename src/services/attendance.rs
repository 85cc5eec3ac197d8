//! Attendance service
//!
//! Student check-in by QR payload, per-session and per-student views, and
//! administrator corrections.

use crate::db::repositories::{AttendanceRepository, SessionRepository, UserRepository};
use crate::models::{
    Attendance, AttendanceStatus, AttendanceSummary, NewAttendance, Session, User, UserRole,
};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Error types for attendance service operations
#[derive(Debug, thiserror::Error)]
pub enum AttendanceServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The session is inactive or past its deadline
    #[error("Session is closed")]
    SessionClosed,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Already checked in to this session")]
    AlreadyCheckedIn,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A session with its records and tallies
#[derive(Debug, Serialize)]
pub struct SessionAttendance {
    pub session: Session,
    pub records: Vec<Attendance>,
    pub summary: AttendanceSummary,
}

pub struct AttendanceService {
    attendance_repo: Arc<dyn AttendanceRepository>,
    session_repo: Arc<dyn SessionRepository>,
    user_repo: Arc<dyn UserRepository>,
    /// Minutes after opening at which check-ins count as late; 0 disables
    late_after_minutes: i64,
}

impl AttendanceService {
    pub fn new(
        attendance_repo: Arc<dyn AttendanceRepository>,
        session_repo: Arc<dyn SessionRepository>,
        user_repo: Arc<dyn UserRepository>,
        late_after_minutes: i64,
    ) -> Self {
        Self {
            attendance_repo,
            session_repo,
            user_repo,
            late_after_minutes,
        }
    }

    /// Record a student's scan of a session QR code.
    pub async fn check_in(
        &self,
        user: &User,
        qr_payload: &str,
    ) -> Result<Attendance, AttendanceServiceError> {
        self.check_in_at(user, qr_payload, Utc::now()).await
    }

    /// `check_in` with an explicit clock
    pub async fn check_in_at(
        &self,
        user: &User,
        qr_payload: &str,
        now: DateTime<Utc>,
    ) -> Result<Attendance, AttendanceServiceError> {
        let session = self
            .session_repo
            .get_by_qr_payload(qr_payload.trim())
            .await
            .context("Failed to look up session")?
            .ok_or_else(|| {
                AttendanceServiceError::NotFound("No session for this QR code".to_string())
            })?;

        if !session.is_open_at(now) {
            return Err(AttendanceServiceError::SessionClosed);
        }

        if user.role != UserRole::Student {
            return Err(AttendanceServiceError::Forbidden(
                "Only students can check in".to_string(),
            ));
        }

        let record = NewAttendance {
            user_id: user.id,
            session_id: session.id,
            check_in_time: now,
            status: self.status_for(&session, now),
            user_name: user.name.clone(),
        };

        let inserted = self
            .attendance_repo
            .insert_if_absent(&record)
            .await
            .context("Failed to record attendance")?
            .ok_or(AttendanceServiceError::AlreadyCheckedIn)?;

        tracing::debug!(
            session_id = session.id,
            user_id = user.id,
            status = %inserted.status,
            "Checked in"
        );
        Ok(inserted)
    }

    /// Records of a session together with present/late/absent counts
    pub async fn session_attendance(
        &self,
        session_id: i64,
    ) -> Result<SessionAttendance, AttendanceServiceError> {
        let session = self
            .session_repo
            .get_by_id(session_id)
            .await
            .context("Failed to get session")?
            .ok_or_else(|| AttendanceServiceError::NotFound(format!("Session {}", session_id)))?;

        let records = self
            .attendance_repo
            .list_by_session(session_id)
            .await
            .context("Failed to list attendance")?;
        let students = self
            .user_repo
            .list_by_role(UserRole::Student)
            .await
            .context("Failed to list students")?;

        let summary = AttendanceSummary::from_records(&records, students.len());
        Ok(SessionAttendance {
            session,
            records,
            summary,
        })
    }

    /// A user's records, newest first
    pub async fn user_attendance(
        &self,
        user_id: i64,
    ) -> Result<Vec<Attendance>, AttendanceServiceError> {
        let records = self
            .attendance_repo
            .list_by_user(user_id)
            .await
            .context("Failed to list attendance")?;

        Ok(records)
    }

    /// Administrator correction of a record's status
    pub async fn update_status(
        &self,
        record_id: i64,
        status: AttendanceStatus,
    ) -> Result<Attendance, AttendanceServiceError> {
        let updated = self
            .attendance_repo
            .update_status(record_id, status)
            .await
            .context("Failed to update attendance")?
            .ok_or_else(|| {
                AttendanceServiceError::NotFound(format!("Attendance record {}", record_id))
            })?;

        tracing::info!(record_id, status = %status, "Attendance status changed");
        Ok(updated)
    }

    fn status_for(&self, session: &Session, now: DateTime<Utc>) -> AttendanceStatus {
        if self.late_after_minutes <= 0 {
            return AttendanceStatus::Present;
        }

        // A threshold past chrono's range is never reached
        let late_from = Duration::try_minutes(self.late_after_minutes)
            .and_then(|threshold| session.created_at.checked_add_signed(threshold));
        match late_from {
            Some(late_from) if now > late_from => AttendanceStatus::Late,
            _ => AttendanceStatus::Present,
        }
    }
}
