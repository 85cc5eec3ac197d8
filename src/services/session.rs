//! Session service
//!
//! Opening, listing and closing attendance sessions. Closing here is the
//! administrator's explicit action; back-filling absences happens only when
//! a session expires (see `services::sweeper`).

use crate::db::repositories::SessionRepository;
use crate::models::{CreateSessionInput, Session, User};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Longest allowed session window (one day)
pub const MAX_DURATION_MINUTES: i32 = 24 * 60;

/// Error types for session service operations
#[derive(Debug, thiserror::Error)]
pub enum SessionServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Session not found: {0}")]
    NotFound(i64),

    /// The session is already closed
    #[error("Session {0} is already closed")]
    AlreadyClosed(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SessionService {
    repo: Arc<dyn SessionRepository>,
}

impl SessionService {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self { repo }
    }

    /// Open a session that accepts check-ins for `duration_minutes` from now.
    pub async fn create_session(
        &self,
        input: CreateSessionInput,
        creator: &User,
    ) -> Result<Session, SessionServiceError> {
        self.create_session_at(input, creator, Utc::now()).await
    }

    /// `create_session` with an explicit clock
    pub async fn create_session_at(
        &self,
        input: CreateSessionInput,
        creator: &User,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(SessionServiceError::ValidationError(
                "Session name cannot be empty".to_string(),
            ));
        }
        if !(1..=MAX_DURATION_MINUTES).contains(&input.duration_minutes) {
            return Err(SessionServiceError::ValidationError(format!(
                "Duration must be between 1 and {} minutes",
                MAX_DURATION_MINUTES
            )));
        }

        let session = Session {
            id: 0,
            name: name.to_string(),
            created_by: creator.id,
            created_at: now,
            expires_at: now + Duration::minutes(i64::from(input.duration_minutes)),
            is_active: true,
            date: input.date,
            time: input.time,
            duration_minutes: Some(input.duration_minutes),
            qr_payload: Some(Uuid::new_v4().to_string()),
        };

        let created = self
            .repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        tracing::info!(
            session_id = created.id,
            name = %created.name,
            expires_at = %created.expires_at,
            "Session opened"
        );
        Ok(created)
    }

    /// All sessions, newest first
    pub async fn list_sessions(&self) -> Result<Vec<Session>, SessionServiceError> {
        let sessions = self
            .repo
            .list_recent()
            .await
            .context("Failed to list sessions")?;

        Ok(sessions)
    }

    pub async fn get_session(&self, id: i64) -> Result<Session, SessionServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get session")?
            .ok_or(SessionServiceError::NotFound(id))
    }

    /// Close an active session without recording absences.
    pub async fn close_session(&self, id: i64) -> Result<Session, SessionServiceError> {
        let session = self.get_session(id).await?;
        if !session.is_active {
            return Err(SessionServiceError::AlreadyClosed(id));
        }

        let closed = self
            .repo
            .deactivate(id)
            .await
            .context("Failed to close session")?
            .ok_or(SessionServiceError::NotFound(id))?;

        tracing::info!(session_id = id, "Session closed by administrator");
        Ok(closed)
    }

    /// Sessions that are active and not yet past their deadline
    pub async fn active_sessions(&self) -> Result<Vec<Session>, SessionServiceError> {
        let now = Utc::now();
        let sessions = self
            .repo
            .list_recent()
            .await
            .context("Failed to list sessions")?;

        Ok(sessions.into_iter().filter(|s| s.is_open_at(now)).collect())
    }
}
