//! Attendance session repository
//!
//! Database operations for attendance sessions.
//!
//! This module provides:
//! - `SessionRepository` trait defining the interface for session data access
//! - `SqlxSessionRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Store a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Session>>;

    /// Get session by the payload encoded in its QR code
    async fn get_by_qr_payload(&self, payload: &str) -> Result<Option<Session>>;

    /// All sessions, newest first
    async fn list_recent(&self) -> Result<Vec<Session>>;

    /// All sessions ordered by ID
    async fn list_all(&self) -> Result<Vec<Session>>;

    /// Clear the active flag. Returns the updated session, or `None` if it
    /// does not exist. Deactivating an inactive session changes nothing.
    async fn deactivate(&self, id: i64) -> Result<Option<Session>>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_session_sqlite(self.pool.sqlite()?, session).await,
            DatabaseDriver::Mysql => create_session_mysql(self.pool.mysql()?, session).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_session_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_session_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_qr_payload(&self, payload: &str) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_session_by_payload_sqlite(self.pool.sqlite()?, payload).await
            }
            DatabaseDriver::Mysql => {
                get_session_by_payload_mysql(self.pool.mysql()?, payload).await
            }
        }
    }

    async fn list_recent(&self) -> Result<Vec<Session>> {
        const ORDER: &str = "ORDER BY created_at DESC, id DESC";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_sessions_sqlite(self.pool.sqlite()?, ORDER).await,
            DatabaseDriver::Mysql => list_sessions_mysql(self.pool.mysql()?, ORDER).await,
        }
    }

    async fn list_all(&self) -> Result<Vec<Session>> {
        const ORDER: &str = "ORDER BY id";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_sessions_sqlite(self.pool.sqlite()?, ORDER).await,
            DatabaseDriver::Mysql => list_sessions_mysql(self.pool.mysql()?, ORDER).await,
        }
    }

    async fn deactivate(&self, id: i64) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                sqlx::query("UPDATE sessions SET is_active = 0 WHERE id = ?")
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to deactivate session")?;
                get_session_by_id_sqlite(pool, id).await
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                sqlx::query("UPDATE sessions SET is_active = FALSE WHERE id = ?")
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to deactivate session")?;
                get_session_by_id_mysql(pool, id).await
            }
        }
    }
}

const SESSION_COLUMNS: &str = "id, name, created_by, created_at, expires_at, is_active, \
     session_date, session_time, duration_minutes, qr_payload";

const INSERT_SESSION: &str = r#"
    INSERT INTO sessions (name, created_by, created_at, expires_at, is_active,
                          session_date, session_time, duration_minutes, qr_payload)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<Session> {
    let result = sqlx::query(INSERT_SESSION)
        .bind(&session.name)
        .bind(session.created_by)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.is_active)
        .bind(session.date)
        .bind(session.time)
        .bind(session.duration_minutes)
        .bind(&session.qr_payload)
        .execute(pool)
        .await
        .context("Failed to create session")?;

    Ok(Session {
        id: result.last_insert_rowid(),
        ..session.clone()
    })
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Session>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    Ok(row.map(|row| row_to_session_sqlite(&row)))
}

async fn get_session_by_payload_sqlite(
    pool: &SqlitePool,
    payload: &str,
) -> Result<Option<Session>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM sessions WHERE qr_payload = ?",
        SESSION_COLUMNS
    ))
    .bind(payload)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by QR payload")?;

    Ok(row.map(|row| row_to_session_sqlite(&row)))
}

async fn list_sessions_sqlite(pool: &SqlitePool, order: &str) -> Result<Vec<Session>> {
    let rows = sqlx::query(&format!("SELECT {} FROM sessions {}", SESSION_COLUMNS, order))
        .fetch_all(pool)
        .await
        .context("Failed to list sessions")?;

    Ok(rows.iter().map(row_to_session_sqlite).collect())
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Session {
    Session {
        id: row.get("id"),
        name: row.get("name"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        is_active: row.get("is_active"),
        date: row.get("session_date"),
        time: row.get("session_time"),
        duration_minutes: row.get("duration_minutes"),
        qr_payload: row.get("qr_payload"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, session: &Session) -> Result<Session> {
    let result = sqlx::query(INSERT_SESSION)
        .bind(&session.name)
        .bind(session.created_by)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.is_active)
        .bind(session.date)
        .bind(session.time)
        .bind(session.duration_minutes)
        .bind(&session.qr_payload)
        .execute(pool)
        .await
        .context("Failed to create session")?;

    Ok(Session {
        id: result.last_insert_id() as i64,
        ..session.clone()
    })
}

async fn get_session_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Session>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    Ok(row.map(|row| row_to_session_mysql(&row)))
}

async fn get_session_by_payload_mysql(
    pool: &MySqlPool,
    payload: &str,
) -> Result<Option<Session>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM sessions WHERE qr_payload = ?",
        SESSION_COLUMNS
    ))
    .bind(payload)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by QR payload")?;

    Ok(row.map(|row| row_to_session_mysql(&row)))
}

async fn list_sessions_mysql(pool: &MySqlPool, order: &str) -> Result<Vec<Session>> {
    let rows = sqlx::query(&format!("SELECT {} FROM sessions {}", SESSION_COLUMNS, order))
        .fetch_all(pool)
        .await
        .context("Failed to list sessions")?;

    Ok(rows.iter().map(row_to_session_mysql).collect())
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Session {
    Session {
        id: row.get("id"),
        name: row.get("name"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        is_active: row.get("is_active"),
        date: row.get("session_date"),
        time: row.get("session_time"),
        duration_minutes: row.get("duration_minutes"),
        qr_payload: row.get("qr_payload"),
    }
}
