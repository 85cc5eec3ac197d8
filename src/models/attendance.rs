//! Attendance record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The durable fact that a user was present, late or absent for a session.
///
/// At most one record exists per (user, session) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendance {
    pub id: i64,
    pub user_id: i64,
    pub session_id: i64,
    /// Display name captured when the record was made
    pub user_name: String,
    /// Scan time, or the sweep time for absences
    pub check_in_time: DateTime<Utc>,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "present"),
            AttendanceStatus::Absent => write!(f, "absent"),
            AttendanceStatus::Late => write!(f, "late"),
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            _ => Err(anyhow::anyhow!("Invalid attendance status: {}", s)),
        }
    }
}

/// A record to be inserted
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub user_id: i64,
    pub session_id: i64,
    pub check_in_time: DateTime<Utc>,
    pub status: AttendanceStatus,
    pub user_name: String,
}

/// Per-session tallies
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub present: usize,
    pub late: usize,
    pub absent: usize,
    /// Students on the roster
    pub total_students: usize,
}

impl AttendanceSummary {
    pub fn from_records(records: &[Attendance], total_students: usize) -> Self {
        let mut summary = Self {
            total_students,
            ..Self::default()
        };
        for record in records {
            match record.status {
                AttendanceStatus::Present => summary.present += 1,
                AttendanceStatus::Late => summary.late += 1,
                AttendanceStatus::Absent => summary.absent += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_and_display() {
        for status in [
            AttendanceStatus::Present,
            AttendanceStatus::Absent,
            AttendanceStatus::Late,
        ] {
            assert_eq!(AttendanceStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert!(AttendanceStatus::from_str("excused").is_err());
    }

    #[test]
    fn test_summary_counts() {
        let record = |status| Attendance {
            id: 0,
            user_id: 0,
            session_id: 1,
            user_name: String::new(),
            check_in_time: Utc::now(),
            status,
        };
        let records = vec![
            record(AttendanceStatus::Present),
            record(AttendanceStatus::Present),
            record(AttendanceStatus::Late),
            record(AttendanceStatus::Absent),
        ];

        let summary = AttendanceSummary::from_records(&records, 5);
        assert_eq!(summary.present, 2);
        assert_eq!(summary.late, 1);
        assert_eq!(summary.absent, 1);
        assert_eq!(summary.total_students, 5);
    }
}
