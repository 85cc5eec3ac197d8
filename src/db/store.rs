//! Storage collaborator for the expiry sweeper
//!
//! `AttendanceStore` is the narrow set of calls the sweeper needs. Keeping
//! it separate from the repositories lets tests substitute a store that
//! fails on demand.

use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use super::repositories::{
    AttendanceRepository, SessionRepository, SqlxAttendanceRepository, SqlxSessionRepository,
    SqlxUserRepository, UserRepository,
};
use super::DynDatabasePool;
use crate::models::{Attendance, NewAttendance, Session, User, UserRole};

/// A read or write through the store failed.
#[derive(Debug, Error)]
#[error("Storage operation {operation} failed: {source}")]
pub struct StorageError {
    /// Name of the failing store call
    pub operation: &'static str,
    #[source]
    source: anyhow::Error,
}

impl StorageError {
    pub fn new(operation: &'static str, source: anyhow::Error) -> Self {
        Self { operation, source }
    }
}

/// Calls the sweeper makes against persistent state
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Every session, active or not, ordered by ID
    async fn get_all_sessions(&self) -> Result<Vec<Session>, StorageError>;

    async fn get_users_by_role(&self, role: UserRole) -> Result<Vec<User>, StorageError>;

    async fn get_attendance_by_session(
        &self,
        session_id: i64,
    ) -> Result<Vec<Attendance>, StorageError>;

    /// Insert a record. `Ok(None)` means one already existed for the pair
    /// and nothing was written.
    async fn mark_attendance(
        &self,
        record: NewAttendance,
    ) -> Result<Option<Attendance>, StorageError>;

    /// Mark a session inactive and return it. Expiring an inactive session
    /// succeeds without changes.
    async fn expire_session(&self, session_id: i64) -> Result<Session, StorageError>;
}

/// `AttendanceStore` backed by the SQLx repositories
pub struct SqlxAttendanceStore {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    attendance: Arc<dyn AttendanceRepository>,
}

impl SqlxAttendanceStore {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self {
            sessions: SqlxSessionRepository::boxed(pool.clone()),
            users: SqlxUserRepository::boxed(pool.clone()),
            attendance: SqlxAttendanceRepository::boxed(pool),
        }
    }

    /// Create a shared store for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AttendanceStore> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AttendanceStore for SqlxAttendanceStore {
    async fn get_all_sessions(&self) -> Result<Vec<Session>, StorageError> {
        self.sessions
            .list_all()
            .await
            .map_err(|e| StorageError::new("get_all_sessions", e))
    }

    async fn get_users_by_role(&self, role: UserRole) -> Result<Vec<User>, StorageError> {
        self.users
            .list_by_role(role)
            .await
            .map_err(|e| StorageError::new("get_users_by_role", e))
    }

    async fn get_attendance_by_session(
        &self,
        session_id: i64,
    ) -> Result<Vec<Attendance>, StorageError> {
        self.attendance
            .list_by_session(session_id)
            .await
            .map_err(|e| StorageError::new("get_attendance_by_session", e))
    }

    async fn mark_attendance(
        &self,
        record: NewAttendance,
    ) -> Result<Option<Attendance>, StorageError> {
        self.attendance
            .insert_if_absent(&record)
            .await
            .map_err(|e| StorageError::new("mark_attendance", e))
    }

    async fn expire_session(&self, session_id: i64) -> Result<Session, StorageError> {
        self.sessions
            .deactivate(session_id)
            .await
            .map_err(|e| StorageError::new("expire_session", e))?
            .ok_or_else(|| {
                StorageError::new(
                    "expire_session",
                    anyhow!("Session {} does not exist", session_id),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::AttendanceStatus;
    use chrono::Utc;

    async fn setup_store() -> (DynDatabasePool, SqlxAttendanceStore) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool.execute(
            "INSERT INTO users (id, username, name, email, password_hash, role) VALUES \
             (1, 'admin', 'Admin', 'admin@example.edu', 'hash', 'admin'), \
             (2, 's1', 'Student One', 's1@example.edu', 'hash', 'student')",
        )
        .await
        .expect("Failed to create users");
        pool.execute(
            "INSERT INTO sessions (id, name, created_by, expires_at, is_active) \
             VALUES (7, 'Lecture', 1, '2030-01-01 00:00:00', 1)",
        )
        .await
        .expect("Failed to create session");
        let store = SqlxAttendanceStore::new(pool.clone());
        (pool, store)
    }

    #[tokio::test]
    async fn test_store_reads() {
        let (_pool, store) = setup_store().await;

        let sessions = store.get_all_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].is_active);

        let students = store.get_users_by_role(UserRole::Student).await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].name, "Student One");

        assert!(store.get_attendance_by_session(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_attendance_ignores_duplicates() {
        let (_pool, store) = setup_store().await;
        let record = NewAttendance {
            user_id: 2,
            session_id: 7,
            check_in_time: Utc::now(),
            status: AttendanceStatus::Absent,
            user_name: "Student One".to_string(),
        };

        assert!(store.mark_attendance(record.clone()).await.unwrap().is_some());
        assert!(store.mark_attendance(record).await.unwrap().is_none());
        assert_eq!(store.get_attendance_by_session(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expire_session() {
        let (_pool, store) = setup_store().await;

        let expired = store.expire_session(7).await.unwrap();
        assert!(!expired.is_active);

        // Expiring twice is harmless
        assert!(!store.expire_session(7).await.unwrap().is_active);

        let err = store.expire_session(404).await.unwrap_err();
        assert_eq!(err.operation, "expire_session");
    }
}
