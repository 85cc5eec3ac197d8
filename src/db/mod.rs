//! Database layer
//!
//! SQLite is the default (single binary, tests); MySQL is available for
//! deployments where several replicas share one database. Repositories
//! dispatch on `DatabasePool::driver()` so callers never see the backend.

pub mod migrations;
pub mod pool;
pub mod repositories;
pub mod store;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
pub use store::{AttendanceStore, SqlxAttendanceStore, StorageError};
