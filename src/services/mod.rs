//! Services layer - Business logic
//!
//! Services implement the rules of attendance taking on top of the
//! repositories:
//! - `UserService`: setup, login, roster management
//! - `SessionService`: opening and closing attendance sessions
//! - `AttendanceService`: check-in and attendance views
//! - `SessionSweeper`: background expiry of sessions with absence back-fill

pub mod attendance;
pub mod password;
pub mod session;
pub mod sweeper;
pub mod user;

pub use attendance::{AttendanceService, AttendanceServiceError, SessionAttendance};
pub use password::{hash_password, verify_password};
pub use session::{SessionService, SessionServiceError};
pub use sweeper::{SessionSweeper, SweepReport, SweeperHandle, DEFAULT_SWEEP_INTERVAL};
pub use user::{ImportReport, LoginInput, SkippedRow, UserService, UserServiceError};
