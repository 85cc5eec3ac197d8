//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{User, UserRole, UserStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Change a user's account status
    async fn update_status(&self, id: i64, status: UserStatus) -> Result<Option<User>>;

    /// Count total users
    async fn count(&self) -> Result<i64>;

    /// Every user holding `role`, ordered by ID
    async fn list_by_role(&self, role: UserRole) -> Result<Vec<User>>;

    /// List users with pagination, optionally filtered by role
    async fn list(
        &self,
        role: Option<UserRole>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<User>, i64)>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_column_sqlite(self.pool.sqlite()?, "username", username).await
            }
            DatabaseDriver::Mysql => {
                get_user_by_column_mysql(self.pool.mysql()?, "username", username).await
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_column_sqlite(self.pool.sqlite()?, "email", email).await
            }
            DatabaseDriver::Mysql => {
                get_user_by_column_mysql(self.pool.mysql()?, "email", email).await
            }
        }
    }

    async fn update_status(&self, id: i64, status: UserStatus) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_user_status_sqlite(self.pool.sqlite()?, id, status).await
            }
            DatabaseDriver::Mysql => update_user_status_mysql(self.pool.mysql()?, id, status).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.sqlite()?, None).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.mysql()?, None).await,
        }
    }

    async fn list_by_role(&self, role: UserRole) -> Result<Vec<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_by_role_sqlite(self.pool.sqlite()?, role).await,
            DatabaseDriver::Mysql => list_users_by_role_mysql(self.pool.mysql()?, role).await,
        }
    }

    async fn list(
        &self,
        role: Option<UserRole>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<User>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_users_sqlite(self.pool.sqlite()?, role, page, per_page).await
            }
            DatabaseDriver::Mysql => {
                list_users_mysql(self.pool.mysql()?, role, page, per_page).await
            }
        }
    }
}

const USER_COLUMNS: &str =
    "id, username, name, email, password_hash, role, status, created_at, updated_at";

fn parse_role(role_str: &str) -> Result<UserRole> {
    UserRole::from_str(role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))
}

fn parse_status(status_str: &str) -> Result<UserStatus> {
    UserStatus::from_str(status_str)
        .with_context(|| format!("Invalid status in database: {}", status_str))
}

/// Rows to skip for a 1-based page. Saturates instead of overflowing, so an
/// absurd page number yields an empty page.
fn page_offset(page: i64, per_page: i64) -> i64 {
    (page.max(1) - 1).saturating_mul(per_page.max(0))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, name, email, password_hash, role, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.status.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.map(|row| row_to_user_sqlite(&row)).transpose()
}

async fn get_user_by_column_sqlite(
    pool: &SqlitePool,
    column: &'static str,
    value: &str,
) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users WHERE {} = ?",
        USER_COLUMNS, column
    ))
    .bind(value)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to get user by {}", column))?;

    row.map(|row| row_to_user_sqlite(&row)).transpose()
}

async fn update_user_status_sqlite(
    pool: &SqlitePool,
    id: i64,
    status: UserStatus,
) -> Result<Option<User>> {
    let result = sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update user status")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    get_user_by_id_sqlite(pool, id).await
}

async fn count_users_sqlite(pool: &SqlitePool, role: Option<UserRole>) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users WHERE (? IS NULL OR role = ?)")
        .bind(role.map(|r| r.to_string()))
        .bind(role.map(|r| r.to_string()))
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_by_role_sqlite(pool: &SqlitePool, role: UserRole) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users WHERE role = ? ORDER BY id",
        USER_COLUMNS
    ))
    .bind(role.to_string())
    .fetch_all(pool)
    .await
    .context("Failed to list users by role")?;

    rows.iter().map(row_to_user_sqlite).collect()
}

async fn list_users_sqlite(
    pool: &SqlitePool,
    role: Option<UserRole>,
    page: i64,
    per_page: i64,
) -> Result<(Vec<User>, i64)> {
    let offset = page_offset(page, per_page);

    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM users
        WHERE (? IS NULL OR role = ?)
        ORDER BY id
        LIMIT ? OFFSET ?
        "#,
        USER_COLUMNS
    ))
    .bind(role.map(|r| r.to_string()))
    .bind(role.map(|r| r.to_string()))
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("Failed to list users")?;

    let users = rows
        .iter()
        .map(row_to_user_sqlite)
        .collect::<Result<Vec<_>>>()?;
    let total = count_users_sqlite(pool, role).await?;

    Ok((users, total))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let status_str: String = row.get("status");

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: parse_role(&role_str)?,
        status: parse_status(&status_str)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, name, email, password_hash, role, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(user.status.to_string())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.map(|row| row_to_user_mysql(&row)).transpose()
}

async fn get_user_by_column_mysql(
    pool: &MySqlPool,
    column: &'static str,
    value: &str,
) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users WHERE {} = ?",
        USER_COLUMNS, column
    ))
    .bind(value)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("Failed to get user by {}", column))?;

    row.map(|row| row_to_user_mysql(&row)).transpose()
}

async fn update_user_status_mysql(
    pool: &MySqlPool,
    id: i64,
    status: UserStatus,
) -> Result<Option<User>> {
    // MySQL reports zero affected rows when the value is unchanged, so check
    // existence by reading back instead.
    sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update user status")?;

    get_user_by_id_mysql(pool, id).await
}

async fn count_users_mysql(pool: &MySqlPool, role: Option<UserRole>) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users WHERE (? IS NULL OR role = ?)")
        .bind(role.map(|r| r.to_string()))
        .bind(role.map(|r| r.to_string()))
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_by_role_mysql(pool: &MySqlPool, role: UserRole) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM users WHERE role = ? ORDER BY id",
        USER_COLUMNS
    ))
    .bind(role.to_string())
    .fetch_all(pool)
    .await
    .context("Failed to list users by role")?;

    rows.iter().map(row_to_user_mysql).collect()
}

async fn list_users_mysql(
    pool: &MySqlPool,
    role: Option<UserRole>,
    page: i64,
    per_page: i64,
) -> Result<(Vec<User>, i64)> {
    let offset = page_offset(page, per_page);

    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM users
        WHERE (? IS NULL OR role = ?)
        ORDER BY id
        LIMIT ? OFFSET ?
        "#,
        USER_COLUMNS
    ))
    .bind(role.map(|r| r.to_string()))
    .bind(role.map(|r| r.to_string()))
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool)
    .await
    .context("Failed to list users")?;

    let users = rows
        .iter()
        .map(row_to_user_mysql)
        .collect::<Result<Vec<_>>>()?;
    let total = count_users_mysql(pool, role).await?;

    Ok((users, total))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");
    let status_str: String = row.get("status");

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: parse_role(&role_str)?,
        status: parse_status(&status_str)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
