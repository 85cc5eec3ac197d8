//! Login session repository
//!
//! Persists the bearer tokens handed out by `/auth/login`.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::AuthSession;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Login session repository trait
#[async_trait]
pub trait AuthSessionRepository: Send + Sync {
    /// Store a new login session
    async fn create(&self, session: &AuthSession) -> Result<AuthSession>;

    /// Get a login session by token
    async fn get_by_id(&self, id: &str) -> Result<Option<AuthSession>>;

    /// Delete a login session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all login sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Delete expired login sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<i64>;
}

/// SQLx-based login session repository
pub struct SqlxAuthSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxAuthSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AuthSessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AuthSessionRepository for SqlxAuthSessionRepository {
    async fn create(&self, session: &AuthSession) -> Result<AuthSession> {
        const INSERT: &str = r#"
            INSERT INTO auth_sessions (id, user_id, expires_at, created_at)
            VALUES (?, ?, ?, ?)
        "#;

        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(INSERT)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|_| ())
            }
            DatabaseDriver::Mysql => {
                sqlx::query(INSERT)
                    .bind(&session.id)
                    .bind(session.user_id)
                    .bind(session.expires_at)
                    .bind(session.created_at)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to create login session")?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AuthSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_auth_session_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_auth_session_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM auth_sessions WHERE id = ?")
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|_| ())
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM auth_sessions WHERE id = ?")
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to delete login session")
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM auth_sessions WHERE user_id = ?")
                    .bind(user_id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|_| ())
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM auth_sessions WHERE user_id = ?")
                    .bind(user_id)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|_| ())
            }
        }
        .context("Failed to delete login sessions by user")
    }

    async fn delete_expired(&self) -> Result<i64> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM auth_sessions WHERE expires_at < ?")
                    .bind(now)
                    .execute(self.pool.sqlite()?)
                    .await
                    .map(|r| r.rows_affected())
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM auth_sessions WHERE expires_at < ?")
                    .bind(now)
                    .execute(self.pool.mysql()?)
                    .await
                    .map(|r| r.rows_affected())
            }
        }
        .context("Failed to delete expired login sessions")?;

        Ok(affected as i64)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_auth_session_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<AuthSession>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, expires_at, created_at
        FROM auth_sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get login session")?;

    Ok(row.map(|row| AuthSession {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_auth_session_mysql(pool: &MySqlPool, id: &str) -> Result<Option<AuthSession>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, expires_at, created_at
        FROM auth_sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get login session")?;

    Ok(row.map(|row| AuthSession {
        id: row.get("id"),
        user_id: row.get("user_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}
