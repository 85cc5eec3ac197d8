//! Session expiry sweeper
//!
//! A background task that closes sessions once their deadline has passed
//! and records every student who never checked in as absent. It runs one
//! pass at start-up and then one pass per interval, measured from the end
//! of the previous pass, so passes never overlap within a process.
//!
//! Several processes may sweep the same database. The `(user_id,
//! session_id)` unique key makes concurrent absence inserts collapse to one
//! record, and expiring an already-closed session changes nothing.

use crate::db::{AttendanceStore, StorageError};
use crate::models::{AttendanceStatus, NewAttendance, Session, UserRole};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default delay between passes
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// What one pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Sessions closed by this pass
    pub sessions_expired: usize,
    /// Absent records written by this pass
    pub absences_recorded: usize,
}

/// Closes expired sessions and back-fills absences.
#[derive(Clone)]
pub struct SessionSweeper {
    store: Arc<dyn AttendanceStore>,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(store: Arc<dyn AttendanceStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one pass as of `now`.
    ///
    /// Sessions are handled one at a time in store order. The first storage
    /// failure ends the pass; sessions not yet handled are picked up by the
    /// next one.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, StorageError> {
        let mut report = SweepReport::default();

        let sessions = self.store.get_all_sessions().await?;
        for session in sessions.iter().filter(|s| s.is_active) {
            if !session.is_expired_at(now) {
                continue;
            }

            let absent = self.expire(session, now).await?;
            report.sessions_expired += 1;
            report.absences_recorded += absent;

            tracing::info!(session_id = session.id, absent, "Session expired");
        }

        tracing::debug!(
            sessions_checked = sessions.len(),
            sessions_expired = report.sessions_expired,
            absences_recorded = report.absences_recorded,
            "Sweep pass finished"
        );
        Ok(report)
    }

    /// Run one pass now, logging and swallowing any storage failure.
    pub async fn sweep(&self) -> Option<SweepReport> {
        match self.run_once(Utc::now()).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(operation = e.operation, "Sweep pass failed: {:#}", e);
                None
            }
        }
    }

    /// Spawn the recurring task.
    ///
    /// The first pass runs immediately. The task stops when the returned
    /// handle is shut down or dropped.
    pub fn start(&self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let sweeper = self.clone();

        let task = tokio::spawn(async move {
            tracing::info!(interval_secs = sweeper.interval.as_secs(), "Session sweeper started");
            loop {
                sweeper.sweep().await;

                tokio::select! {
                    _ = tokio::time::sleep(sweeper.interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
            tracing::info!("Session sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Record absences for one expired session, then close it. Returns the
    /// number of absent records written.
    async fn expire(&self, session: &Session, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let students = self.store.get_users_by_role(UserRole::Student).await?;
        let recorded: HashSet<i64> = self
            .store
            .get_attendance_by_session(session.id)
            .await?
            .into_iter()
            .map(|record| record.user_id)
            .collect();

        let mut absent = 0;
        for student in students.iter().filter(|u| !recorded.contains(&u.id)) {
            let record = NewAttendance {
                user_id: student.id,
                session_id: session.id,
                check_in_time: now,
                status: AttendanceStatus::Absent,
                user_name: student.name.clone(),
            };
            // None means another writer got there first
            if self.store.mark_attendance(record).await?.is_some() {
                absent += 1;
            }
        }

        self.store.expire_session(session.id).await?;
        Ok(absent)
    }
}

/// Owner of a running sweeper task
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the task and wait for it to finish. A pass already in progress
    /// completes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("Session sweeper task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations, DynDatabasePool, SqlxAttendanceStore};
    use crate::models::{Attendance, User};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, SubsecRound};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn setup_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool.execute(
            "INSERT INTO users (id, username, name, email, password_hash, role) \
             VALUES (1, 'admin', 'Admin', 'admin@example.edu', 'hash', 'admin')",
        )
        .await
        .expect("Failed to create admin");
        pool
    }

    async fn add_student(pool: &DynDatabasePool, id: i64) {
        pool.execute(&format!(
            "INSERT INTO users (id, username, name, email, password_hash, role) \
             VALUES ({id}, 's{id}', 'Student {id}', 's{id}@example.edu', 'hash', 'student')"
        ))
        .await
        .expect("Failed to create student");
    }

    async fn add_session(pool: &DynDatabasePool, id: i64, expires_at: DateTime<Utc>) {
        sqlx::query(
            "INSERT INTO sessions (id, name, created_by, created_at, expires_at, is_active) \
             VALUES (?, ?, 1, ?, ?, 1)",
        )
        .bind(id)
        .bind(format!("Session {}", id))
        .bind(expires_at - ChronoDuration::hours(1))
        .bind(expires_at)
        .execute(pool.sqlite().unwrap())
        .await
        .expect("Failed to create session");
    }

    async fn mark(
        store: &dyn AttendanceStore,
        user_id: i64,
        session_id: i64,
        at: DateTime<Utc>,
        status: AttendanceStatus,
    ) -> Attendance {
        store
            .mark_attendance(NewAttendance {
                user_id,
                session_id,
                check_in_time: at,
                status,
                user_name: format!("Student {}", user_id),
            })
            .await
            .unwrap()
            .unwrap()
    }

    async fn session(store: &dyn AttendanceStore, id: i64) -> Session {
        store
            .get_all_sessions()
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.id == id)
            .expect("Session not found")
    }

    fn sweeper(store: Arc<dyn AttendanceStore>) -> SessionSweeper {
        SessionSweeper::new(store, DEFAULT_SWEEP_INTERVAL)
    }

    #[tokio::test]
    async fn test_expired_session_is_closed_and_absences_filled() {
        let pool = setup_pool().await;
        add_student(&pool, 10).await; // A
        add_student(&pool, 11).await; // B
        let now = Utc::now();
        add_session(&pool, 1, now - ChronoDuration::minutes(1)).await;

        let store = SqlxAttendanceStore::boxed(pool.clone());
        let scanned_at = now - ChronoDuration::minutes(30);
        let a_record = mark(store.as_ref(), 10, 1, scanned_at, AttendanceStatus::Present).await;

        let report = sweeper(store.clone()).run_once(now).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                sessions_expired: 1,
                absences_recorded: 1
            }
        );

        assert!(!session(store.as_ref(), 1).await.is_active);

        let records = store.get_attendance_by_session(1).await.unwrap();
        assert_eq!(records.len(), 2);

        let a = records.iter().find(|r| r.user_id == 10).unwrap();
        assert_eq!(a.id, a_record.id);
        assert_eq!(a.status, AttendanceStatus::Present);
        assert_eq!(a.check_in_time.timestamp_millis(), scanned_at.timestamp_millis());

        let b = records.iter().find(|r| r.user_id == 11).unwrap();
        assert_eq!(b.status, AttendanceStatus::Absent);
        assert_eq!(b.user_name, "Student 11");
        assert_eq!(b.check_in_time.timestamp_millis(), now.timestamp_millis());
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let pool = setup_pool().await;
        add_student(&pool, 10).await;
        add_student(&pool, 11).await;
        let now = Utc::now();
        add_session(&pool, 1, now - ChronoDuration::minutes(5)).await;

        let store = SqlxAttendanceStore::boxed(pool.clone());
        let sweeper = sweeper(store.clone());

        let first = sweeper.run_once(now).await.unwrap();
        assert_eq!(first.absences_recorded, 2);

        let second = sweeper
            .run_once(now + ChronoDuration::minutes(1))
            .await
            .unwrap();
        assert_eq!(second, SweepReport::default());
        assert_eq!(store.get_attendance_by_session(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_future_and_inactive_sessions_untouched() {
        let pool = setup_pool().await;
        add_student(&pool, 10).await;
        let now = Utc::now();
        add_session(&pool, 1, now + ChronoDuration::minutes(10)).await;
        add_session(&pool, 2, now - ChronoDuration::minutes(10)).await;
        // Closed by hand before expiry: no back-fill
        pool.execute("UPDATE sessions SET is_active = 0 WHERE id = 2")
            .await
            .unwrap();

        let store = SqlxAttendanceStore::boxed(pool.clone());
        let report = sweeper(store.clone()).run_once(now).await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert!(session(store.as_ref(), 1).await.is_active);
        assert!(store.get_attendance_by_session(1).await.unwrap().is_empty());
        assert!(store.get_attendance_by_session(2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_is_exclusive() {
        let pool = setup_pool().await;
        add_student(&pool, 10).await;
        let deadline = Utc::now().trunc_subsecs(0);
        add_session(&pool, 1, deadline).await;

        let store = SqlxAttendanceStore::boxed(pool.clone());
        let sweeper = sweeper(store.clone());

        let at_deadline = sweeper.run_once(deadline).await.unwrap();
        assert_eq!(at_deadline.sessions_expired, 0);

        let after = sweeper
            .run_once(deadline + ChronoDuration::seconds(1))
            .await
            .unwrap();
        assert_eq!(after.sessions_expired, 1);
    }

    #[tokio::test]
    async fn test_admins_get_no_absent_record() {
        let pool = setup_pool().await;
        add_student(&pool, 10).await;
        let now = Utc::now();
        add_session(&pool, 1, now - ChronoDuration::minutes(1)).await;

        let store = SqlxAttendanceStore::boxed(pool.clone());
        sweeper(store.clone()).run_once(now).await.unwrap();

        let users: Vec<i64> = store
            .get_attendance_by_session(1)
            .await
            .unwrap()
            .iter()
            .map(|r| r.user_id)
            .collect();
        assert_eq!(users, vec![10]);
    }

    #[tokio::test]
    async fn test_no_students_still_closes_session() {
        let pool = setup_pool().await;
        let now = Utc::now();
        add_session(&pool, 1, now - ChronoDuration::minutes(1)).await;

        let store = SqlxAttendanceStore::boxed(pool.clone());
        let report = sweeper(store.clone()).run_once(now).await.unwrap();

        assert_eq!(report.sessions_expired, 1);
        assert_eq!(report.absences_recorded, 0);
        assert!(!session(store.as_ref(), 1).await.is_active);
    }

    /// Delegates to a real store but fails the first attendance read for
    /// one session.
    struct FlakyStore {
        inner: Arc<dyn AttendanceStore>,
        fail_session: i64,
        failed: AtomicBool,
    }

    #[async_trait]
    impl AttendanceStore for FlakyStore {
        async fn get_all_sessions(&self) -> Result<Vec<Session>, StorageError> {
            self.inner.get_all_sessions().await
        }

        async fn get_users_by_role(&self, role: UserRole) -> Result<Vec<User>, StorageError> {
            self.inner.get_users_by_role(role).await
        }

        async fn get_attendance_by_session(
            &self,
            session_id: i64,
        ) -> Result<Vec<Attendance>, StorageError> {
            if session_id == self.fail_session && !self.failed.swap(true, Ordering::SeqCst) {
                return Err(StorageError::new(
                    "get_attendance_by_session",
                    anyhow::anyhow!("connection reset"),
                ));
            }
            self.inner.get_attendance_by_session(session_id).await
        }

        async fn mark_attendance(
            &self,
            record: NewAttendance,
        ) -> Result<Option<Attendance>, StorageError> {
            self.inner.mark_attendance(record).await
        }

        async fn expire_session(&self, session_id: i64) -> Result<Session, StorageError> {
            self.inner.expire_session(session_id).await
        }
    }

    #[tokio::test]
    async fn test_storage_error_aborts_pass_and_next_pass_recovers() {
        let pool = setup_pool().await;
        add_student(&pool, 10).await;
        add_student(&pool, 11).await;
        let now = Utc::now();
        for id in 1..=3 {
            add_session(&pool, id, now - ChronoDuration::minutes(1)).await;
        }

        let inner = SqlxAttendanceStore::boxed(pool.clone());
        let store: Arc<dyn AttendanceStore> = Arc::new(FlakyStore {
            inner: inner.clone(),
            fail_session: 1,
            failed: AtomicBool::new(false),
        });
        let sweeper = sweeper(store);

        let err = sweeper.run_once(now).await.unwrap_err();
        assert_eq!(err.operation, "get_attendance_by_session");
        for id in 1..=3 {
            assert!(session(inner.as_ref(), id).await.is_active);
            assert!(inner.get_attendance_by_session(id).await.unwrap().is_empty());
        }

        let report = sweeper.run_once(now).await.unwrap();
        assert_eq!(report.sessions_expired, 3);
        assert_eq!(report.absences_recorded, 6);
        for id in 1..=3 {
            assert!(!session(inner.as_ref(), id).await.is_active);
            assert_eq!(inner.get_attendance_by_session(id).await.unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_sweep_swallows_errors() {
        let pool = setup_pool().await;
        add_student(&pool, 10).await;
        add_session(&pool, 1, Utc::now() - ChronoDuration::minutes(1)).await;

        let store: Arc<dyn AttendanceStore> = Arc::new(FlakyStore {
            inner: SqlxAttendanceStore::boxed(pool.clone()),
            fail_session: 1,
            failed: AtomicBool::new(false),
        });
        let sweeper = sweeper(store);

        assert!(sweeper.sweep().await.is_none());
        assert_eq!(sweeper.sweep().await.map(|r| r.sessions_expired), Some(1));
    }

    #[tokio::test]
    async fn test_started_sweeper_runs_immediately_and_shuts_down() {
        let pool = setup_pool().await;
        add_student(&pool, 10).await;
        add_session(&pool, 1, Utc::now() - ChronoDuration::minutes(1)).await;

        let store = SqlxAttendanceStore::boxed(pool.clone());
        let handle = SessionSweeper::new(store.clone(), Duration::from_secs(3600)).start();

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if !session(store.as_ref(), 1).await.is_active {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(closed.is_ok(), "first pass should run at start-up");

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown should not wait for the next interval");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// After one pass every expired session is closed and every student
        /// holds exactly one record for it; pre-existing records are kept and
        /// unexpired sessions are untouched.
        #[test]
        fn pass_leaves_expired_sessions_complete(
            students in 0usize..5,
            present_mask in prop::collection::vec(any::<bool>(), 5),
            expired in prop::collection::vec(any::<bool>(), 1..4),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let pool = setup_pool().await;
                let now = Utc::now();
                for i in 0..students {
                    add_student(&pool, 100 + i as i64).await;
                }
                for (i, is_expired) in expired.iter().enumerate() {
                    let offset = ChronoDuration::minutes(if *is_expired { -5 } else { 5 });
                    add_session(&pool, 1 + i as i64, now + offset).await;
                }

                let store = SqlxAttendanceStore::boxed(pool.clone());
                for session_id in 1..=expired.len() as i64 {
                    for i in 0..students {
                        if present_mask[i] {
                            mark(store.as_ref(), 100 + i as i64, session_id,
                                 now - ChronoDuration::minutes(1), AttendanceStatus::Present).await;
                        }
                    }
                }

                sweeper(store.clone()).run_once(now).await.expect("pass failed");

                for (i, is_expired) in expired.iter().enumerate() {
                    let id = 1 + i as i64;
                    let records = store.get_attendance_by_session(id).await.unwrap();
                    prop_assert_eq!(session(store.as_ref(), id).await.is_active, !*is_expired);

                    for s in 0..students {
                        let user_id = 100 + s as i64;
                        let mine: Vec<&Attendance> =
                            records.iter().filter(|r| r.user_id == user_id).collect();
                        let expected_status = match (present_mask[s], *is_expired) {
                            (true, _) => Some(AttendanceStatus::Present),
                            (false, true) => Some(AttendanceStatus::Absent),
                            (false, false) => None,
                        };
                        prop_assert_eq!(mine.first().map(|r| r.status), expected_status);
                        prop_assert!(mine.len() <= 1);
                    }
                }
                Ok(())
            });
            result?;
        }
    }
}
