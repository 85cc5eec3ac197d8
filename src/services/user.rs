//! User service
//!
//! Accounts and authentication:
//! - First-run setup (the first account is an administrator)
//! - Login/logout with argon2 password checks
//! - Login session validation and cleanup
//! - Roster management: create, bulk import, list, activate/deactivate

use crate::db::repositories::{AuthSessionRepository, UserRepository};
use crate::models::{AuthSession, CreateUserInput, User, UserRole, UserStatus};
use crate::services::password::{hash_password, verify_password};
use anyhow::{anyhow, Context};
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Default login session lifetime in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials or inactive account)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Setup was requested but users already exist
    #[error("Setup has already been completed")]
    SetupComplete,

    #[error("User not found")]
    UserNotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}

/// A row that could not be imported
#[derive(Debug, Clone, Serialize)]
pub struct SkippedRow {
    /// Zero-based position in the submitted list
    pub row: usize,
    pub username: String,
    pub reason: String,
}

/// Outcome of a bulk student import
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub created: Vec<User>,
    pub skipped: Vec<SkippedRow>,
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    auth_session_repo: Arc<dyn AuthSessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        auth_session_repo: Arc<dyn AuthSessionRepository>,
    ) -> Self {
        Self::with_session_expiration(user_repo, auth_session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    /// Create a user service with a custom login session lifetime
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        auth_session_repo: Arc<dyn AuthSessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            auth_session_repo,
            session_expiration_days,
        }
    }

    /// True until the first account exists
    pub async fn needs_setup(&self) -> Result<bool, UserServiceError> {
        let count = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?;

        Ok(count == 0)
    }

    /// Create the first administrator and log them in.
    ///
    /// Refused with `SetupComplete` once any user exists.
    pub async fn setup(
        &self,
        input: CreateUserInput,
    ) -> Result<(User, AuthSession), UserServiceError> {
        if !self.needs_setup().await? {
            return Err(UserServiceError::SetupComplete);
        }

        let admin = self
            .create_user(CreateUserInput {
                role: Some(UserRole::Admin),
                ..input
            })
            .await?;
        let session = self.create_auth_session(admin.id).await?;

        tracing::info!(user_id = admin.id, username = %admin.username, "Initial administrator created");
        Ok((admin, session))
    }

    /// Check credentials and open a login session.
    pub async fn login(&self, input: LoginInput) -> Result<(User, AuthSession), UserServiceError> {
        let invalid =
            || UserServiceError::AuthenticationError("Invalid username or password".to_string());

        let user = self
            .find_user_by_username_or_email(&input.username_or_email)
            .await?
            .ok_or_else(invalid)?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !password_valid {
            return Err(invalid());
        }

        if !user.is_active() {
            return Err(UserServiceError::AuthenticationError(
                "This account has been deactivated".to_string(),
            ));
        }

        let session = self.create_auth_session(user.id).await?;
        Ok((user, session))
    }

    /// Invalidate a login token
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.auth_session_repo
            .delete(token)
            .await
            .context("Failed to delete login session")?;

        Ok(())
    }

    /// Resolve a login token to its user.
    ///
    /// Unknown tokens, expired tokens (which are deleted on sight) and tokens
    /// of deactivated users all yield `None`.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .auth_session_repo
            .get_by_id(token)
            .await
            .context("Failed to get login session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.auth_session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired login session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user.filter(User::is_active))
    }

    /// Delete every expired login session, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let count = self
            .auth_session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired login sessions")?;

        Ok(count)
    }

    /// Create an account. The role defaults to student.
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let input = CreateUserInput {
            username: input.username.trim().to_string(),
            name: input.name.trim().to_string(),
            email: input.email.trim().to_string(),
            ..input
        };
        validate_user_input(&input)?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                input.username
            )));
        }

        if self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(
            input.username,
            input.name,
            input.email,
            password_hash,
            input.role.unwrap_or_default(),
        );

        // A concurrent insert can still win the race past the checks above
        let created = match self.user_repo.create(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::UserExists(format!(
                    "Username '{}' or email '{}' is already registered",
                    user.username, user.email
                )));
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        Ok(created)
    }

    /// Create each row as a student. Bad rows are reported and skipped; they
    /// never abort the rest of the import.
    pub async fn import_students(
        &self,
        rows: Vec<CreateUserInput>,
    ) -> Result<ImportReport, UserServiceError> {
        let mut report = ImportReport::default();

        for (row, input) in rows.into_iter().enumerate() {
            let username = input.username.clone();
            let input = CreateUserInput {
                role: Some(UserRole::Student),
                ..input
            };

            match self.create_user(input).await {
                Ok(user) => report.created.push(user),
                Err(UserServiceError::ValidationError(reason))
                | Err(UserServiceError::UserExists(reason)) => {
                    report.skipped.push(SkippedRow {
                        row,
                        username,
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            created = report.created.len(),
            skipped = report.skipped.len(),
            "Student import finished"
        );
        Ok(report)
    }

    /// List users, optionally restricted to one role
    pub async fn list_users(
        &self,
        role: Option<UserRole>,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<User>, i64), UserServiceError> {
        let result = self
            .user_repo
            .list(role, page.max(1), per_page.clamp(1, 100))
            .await
            .context("Failed to list users")?;

        Ok(result)
    }

    /// Activate or deactivate an account. Deactivation also ends the user's
    /// login sessions.
    pub async fn update_status(
        &self,
        id: i64,
        status: UserStatus,
    ) -> Result<User, UserServiceError> {
        let user = self
            .user_repo
            .update_status(id, status)
            .await
            .context("Failed to update user status")?
            .ok_or(UserServiceError::UserNotFound)?;

        if status == UserStatus::Inactive {
            self.auth_session_repo
                .delete_by_user(id)
                .await
                .context("Failed to delete login sessions")?;
        }

        Ok(user)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        let user = self
            .user_repo
            .get_by_email(username_or_email)
            .await
            .context("Failed to get user by email")?;

        Ok(user)
    }

    async fn create_auth_session(&self, user_id: i64) -> Result<AuthSession, UserServiceError> {
        let now = Utc::now();
        let expires_at = Duration::try_days(self.session_expiration_days)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                anyhow!(
                    "Login session lifetime of {} days is out of range",
                    self.session_expiration_days
                )
            })?;
        let session = AuthSession {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at,
            created_at: now,
        };

        let created = self
            .auth_session_repo
            .create(&session)
            .await
            .context("Failed to create login session")?;

        Ok(created)
    }
}

/// True when a database unique key rejected the write
fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<sqlx::Error>())
        .any(|e| matches!(e, sqlx::Error::Database(db) if db.is_unique_violation()))
}

fn validate_user_input(input: &CreateUserInput) -> Result<(), UserServiceError> {
    if input.username.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty".to_string(),
        ));
    }

    if input.name.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Name cannot be empty".to_string(),
        ));
    }

    if input.password.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Password cannot be empty".to_string(),
        ));
    }

    if !input.email.contains('@') {
        return Err(UserServiceError::ValidationError(
            "Invalid email format".to_string(),
        ));
    }

    Ok(())
}
