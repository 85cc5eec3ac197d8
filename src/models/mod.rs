//! Data models
//!
//! Database entities (User, AuthSession, Session, Attendance) and the input
//! types services accept.

mod attendance;
mod auth_session;
mod session;
mod user;

pub use attendance::{Attendance, AttendanceStatus, AttendanceSummary, NewAttendance};
pub use auth_session::AuthSession;
pub use session::{CreateSessionInput, Session};
pub use user::{CreateUserInput, User, UserRole, UserStatus};
