//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a specific entity.

pub mod attendance;
pub mod auth_session;
pub mod session;
pub mod user;

pub use attendance::{AttendanceRepository, SqlxAttendanceRepository};
pub use auth_session::{AuthSessionRepository, SqlxAuthSessionRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
