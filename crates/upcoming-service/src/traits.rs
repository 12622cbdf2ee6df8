use async_trait::async_trait;
use thiserror::Error;
use upcoming_core::task::{Task, TaskQuery, TaskUpdate};

use crate::Session;

/// Failures surfaced by the hosted backend.
///
/// Both variants display as the bare message so screens can show it
/// verbatim. They are not classified any further.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Sign-in, sign-out and session handling.
    #[error("{0}")]
    Auth(String),

    /// Reads and updates against the data API.
    #[error("{0}")]
    Query(String),
}

impl ServiceError {
    pub fn message(&self) -> &str {
        match self {
            ServiceError::Auth(msg) | ServiceError::Query(msg) => msg,
        }
    }
}

/// Client handle for the hosted auth and data APIs.
///
/// The app is handed an `Arc<dyn Backend>` at construction.
/// `HttpBackend` talks to a real Supabase project.
/// `MockBackend` is an in-memory stand-in for tests.
#[async_trait]
pub trait Backend: Send + Sync {
    // -- Auth --

    /// Establish the session. If `location` (the address the user landed on
    /// after opening a sign-in link) carries a token, it is consumed and
    /// becomes the current session. Otherwise the stored session is returned.
    /// Calling it again with the same input is harmless.
    async fn get_session(&self, location: Option<&str>) -> Result<Option<Session>, ServiceError>;

    /// Ask the auth service to email a one-time sign-in link to `email`.
    /// The link sends the user to `redirect_to`.
    async fn sign_in_with_otp(&self, email: &str, redirect_to: &str) -> Result<(), ServiceError>;

    async fn sign_out(&self) -> Result<(), ServiceError>;

    // -- Data --

    async fn query_rows(&self, query: &TaskQuery) -> Result<Vec<Task>, ServiceError>;

    async fn update_row(
        &self,
        table: &str,
        id: &str,
        update: &TaskUpdate,
    ) -> Result<(), ServiceError>;
}
