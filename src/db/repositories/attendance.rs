//! Attendance repository
//!
//! Records are only ever inserted or re-labelled, never deleted. Inserts go
//! through `insert_if_absent`, which relies on the `(user_id, session_id)`
//! unique key so that concurrent writers cannot create a second record for
//! the same pair.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Attendance, AttendanceStatus, NewAttendance};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// Attendance repository trait
#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    /// Insert a record unless one already exists for the (user, session)
    /// pair. Returns `None` when the insert was ignored.
    async fn insert_if_absent(&self, record: &NewAttendance) -> Result<Option<Attendance>>;

    /// Get a record by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Attendance>>;

    /// All records of a session, ordered by ID
    async fn list_by_session(&self, session_id: i64) -> Result<Vec<Attendance>>;

    /// All records of a user, newest first
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Attendance>>;

    /// Change a record's status
    async fn update_status(&self, id: i64, status: AttendanceStatus)
        -> Result<Option<Attendance>>;
}

/// SQLx-based attendance repository implementation
pub struct SqlxAttendanceRepository {
    pool: DynDatabasePool,
}

impl SqlxAttendanceRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AttendanceRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AttendanceRepository for SqlxAttendanceRepository {
    async fn insert_if_absent(&self, record: &NewAttendance) -> Result<Option<Attendance>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => insert_attendance_sqlite(self.pool.sqlite()?, record).await,
            DatabaseDriver::Mysql => insert_attendance_mysql(self.pool.mysql()?, record).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Attendance>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_attendance_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_attendance_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn list_by_session(&self, session_id: i64) -> Result<Vec<Attendance>> {
        const FILTER: &str = "WHERE session_id = ? ORDER BY id";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_attendance_sqlite(self.pool.sqlite()?, FILTER, session_id).await
            }
            DatabaseDriver::Mysql => {
                list_attendance_mysql(self.pool.mysql()?, FILTER, session_id).await
            }
        }
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Attendance>> {
        const FILTER: &str = "WHERE user_id = ? ORDER BY check_in_time DESC, id DESC";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_attendance_sqlite(self.pool.sqlite()?, FILTER, user_id).await
            }
            DatabaseDriver::Mysql => {
                list_attendance_mysql(self.pool.mysql()?, FILTER, user_id).await
            }
        }
    }

    async fn update_status(
        &self,
        id: i64,
        status: AttendanceStatus,
    ) -> Result<Option<Attendance>> {
        const UPDATE: &str = "UPDATE attendance SET status = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                sqlx::query(UPDATE)
                    .bind(status.to_string())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update attendance status")?;
                get_attendance_sqlite(pool, id).await
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                sqlx::query(UPDATE)
                    .bind(status.to_string())
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update attendance status")?;
                get_attendance_mysql(pool, id).await
            }
        }
    }
}

const ATTENDANCE_COLUMNS: &str = "id, user_id, session_id, user_name, check_in_time, status";

fn parse_status(status_str: &str) -> Result<AttendanceStatus> {
    AttendanceStatus::from_str(status_str)
        .with_context(|| format!("Invalid attendance status in database: {}", status_str))
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_attendance_sqlite(
    pool: &SqlitePool,
    record: &NewAttendance,
) -> Result<Option<Attendance>> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO attendance (user_id, session_id, user_name, check_in_time, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.user_id)
    .bind(record.session_id)
    .bind(&record.user_name)
    .bind(record.check_in_time)
    .bind(record.status.to_string())
    .execute(pool)
    .await
    .context("Failed to insert attendance")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(Attendance {
        id: result.last_insert_rowid(),
        user_id: record.user_id,
        session_id: record.session_id,
        user_name: record.user_name.clone(),
        check_in_time: record.check_in_time,
        status: record.status,
    }))
}

async fn get_attendance_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Attendance>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM attendance WHERE id = ?",
        ATTENDANCE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get attendance by ID")?;

    row.map(|row| row_to_attendance_sqlite(&row)).transpose()
}

async fn list_attendance_sqlite(
    pool: &SqlitePool,
    filter: &str,
    key: i64,
) -> Result<Vec<Attendance>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM attendance {}",
        ATTENDANCE_COLUMNS, filter
    ))
    .bind(key)
    .fetch_all(pool)
    .await
    .context("Failed to list attendance")?;

    rows.iter().map(row_to_attendance_sqlite).collect()
}

fn row_to_attendance_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Attendance> {
    let status_str: String = row.get("status");
    Ok(Attendance {
        id: row.get("id"),
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
        user_name: row.get("user_name"),
        check_in_time: row.get("check_in_time"),
        status: parse_status(&status_str)?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_attendance_mysql(
    pool: &MySqlPool,
    record: &NewAttendance,
) -> Result<Option<Attendance>> {
    let result = sqlx::query(
        r#"
        INSERT IGNORE INTO attendance (user_id, session_id, user_name, check_in_time, status)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.user_id)
    .bind(record.session_id)
    .bind(&record.user_name)
    .bind(record.check_in_time)
    .bind(record.status.to_string())
    .execute(pool)
    .await
    .context("Failed to insert attendance")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(Attendance {
        id: result.last_insert_id() as i64,
        user_id: record.user_id,
        session_id: record.session_id,
        user_name: record.user_name.clone(),
        check_in_time: record.check_in_time,
        status: record.status,
    }))
}

async fn get_attendance_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Attendance>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM attendance WHERE id = ?",
        ATTENDANCE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get attendance by ID")?;

    row.map(|row| row_to_attendance_mysql(&row)).transpose()
}

async fn list_attendance_mysql(
    pool: &MySqlPool,
    filter: &str,
    key: i64,
) -> Result<Vec<Attendance>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM attendance {}",
        ATTENDANCE_COLUMNS, filter
    ))
    .bind(key)
    .fetch_all(pool)
    .await
    .context("Failed to list attendance")?;

    rows.iter().map(row_to_attendance_mysql).collect()
}

fn row_to_attendance_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Attendance> {
    let status_str: String = row.get("status");
    Ok(Attendance {
        id: row.get("id"),
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
        user_name: row.get("user_name"),
        check_in_time: row.get("check_in_time"),
        status: parse_status(&status_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::{Duration, Utc};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxAttendanceRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool.execute(
            "INSERT INTO users (id, username, name, email, password_hash, role) VALUES \
             (1, 'admin', 'Admin', 'admin@example.edu', 'hash', 'admin'), \
             (2, 's1', 'Student One', 's1@example.edu', 'hash', 'student'), \
             (3, 's2', 'Student Two', 's2@example.edu', 'hash', 'student')",
        )
        .await
        .expect("Failed to create users");
        pool.execute(
            "INSERT INTO sessions (id, name, created_by, expires_at, is_active) VALUES \
             (10, 'Lecture', 1, '2030-01-01 00:00:00', 1), \
             (11, 'Lab', 1, '2030-01-01 00:00:00', 1)",
        )
        .await
        .expect("Failed to create sessions");
        let repo = SqlxAttendanceRepository::new(pool.clone());
        (pool, repo)
    }

    fn record(user_id: i64, session_id: i64, status: AttendanceStatus) -> NewAttendance {
        NewAttendance {
            user_id,
            session_id,
            check_in_time: Utc::now(),
            status,
            user_name: format!("user {}", user_id),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let (_pool, repo) = setup_test_repo().await;

        let inserted = repo
            .insert_if_absent(&record(2, 10, AttendanceStatus::Present))
            .await
            .expect("Failed to insert")
            .expect("Insert was ignored");
        assert!(inserted.id > 0);

        let found = repo.get_by_id(inserted.id).await.unwrap().unwrap();
        assert_eq!(found.status, AttendanceStatus::Present);
        assert_eq!(found.user_name, "user 2");
    }

    #[tokio::test]
    async fn test_duplicate_pair_is_ignored() {
        let (_pool, repo) = setup_test_repo().await;

        let first = repo
            .insert_if_absent(&record(2, 10, AttendanceStatus::Present))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = repo
            .insert_if_absent(&record(2, 10, AttendanceStatus::Absent))
            .await
            .unwrap();
        assert!(second.is_none());

        let records = repo.list_by_session(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn test_list_by_session_and_user() {
        let (_pool, repo) = setup_test_repo().await;
        let mut earlier = record(2, 10, AttendanceStatus::Present);
        earlier.check_in_time = Utc::now() - Duration::days(1);
        repo.insert_if_absent(&earlier).await.unwrap();
        repo.insert_if_absent(&record(3, 10, AttendanceStatus::Absent)).await.unwrap();
        repo.insert_if_absent(&record(2, 11, AttendanceStatus::Late)).await.unwrap();

        let session_records = repo.list_by_session(10).await.unwrap();
        let users: Vec<i64> = session_records.iter().map(|r| r.user_id).collect();
        assert_eq!(users, vec![2, 3]);

        let user_records = repo.list_by_user(2).await.unwrap();
        let sessions: Vec<i64> = user_records.iter().map(|r| r.session_id).collect();
        assert_eq!(sessions, vec![11, 10]);
    }

    #[tokio::test]
    async fn test_update_status() {
        let (_pool, repo) = setup_test_repo().await;
        let inserted = repo
            .insert_if_absent(&record(2, 10, AttendanceStatus::Absent))
            .await
            .unwrap()
            .unwrap();

        let updated = repo
            .update_status(inserted.id, AttendanceStatus::Present)
            .await
            .unwrap()
            .expect("Record not found");
        assert_eq!(updated.status, AttendanceStatus::Present);
        assert_eq!(
            updated.check_in_time.timestamp_millis(),
            inserted.check_in_time.timestamp_millis()
        );

        assert!(repo
            .update_status(999, AttendanceStatus::Late)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_session_is_rejected() {
        let (_pool, repo) = setup_test_repo().await;

        let result = repo
            .insert_if_absent(&record(2, 999, AttendanceStatus::Present))
            .await;
        assert!(result.is_err());
    }
}
