//! Login session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bearer/cookie token issued at login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Token
    pub id: String,
    /// Associated user ID
    pub user_id: i64,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl AuthSession {
    /// Check if the token has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}
