//! Common API utilities and shared types

use serde::Deserialize;

use crate::models::UserRole;

/// Default page number (1-indexed)
pub fn default_page() -> i64 {
    1
}

/// Default page size for admin listings
pub fn default_per_page() -> i64 {
    20
}

/// Query parameters for `GET /admin/users`
#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

/// Number of pages needed to show `total` items
pub fn total_pages(total: i64, per_page: i64) -> i64 {
    if per_page <= 0 {
        return 0;
    }
    (total + per_page - 1) / per_page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
        assert_eq!(total_pages(5, 0), 0);
    }
}
