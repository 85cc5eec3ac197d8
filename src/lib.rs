//! Rollcall - QR attendance tracking service
//!
//! Administrators open time-boxed sessions; students check in by scanning
//! the session's QR code. A background sweeper closes sessions once their
//! deadline passes and records every student who never checked in as
//! absent.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
