use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use upcoming_core::task::{Task, TaskQuery, TaskUpdate};

use crate::{Backend, ServiceError, Session};

/// A call the mock received, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    GetSession { location: Option<String> },
    SignInWithOtp { email: String, redirect_to: String },
    SignOut,
    QueryRows(TaskQuery),
    UpdateRow {
        table: String,
        id: String,
        update: TaskUpdate,
    },
}

#[derive(Default)]
struct MockState {
    rows: Vec<Task>,
    session: Option<Session>,
    session_error: Option<String>,
    sign_in_error: Option<String>,
    sign_out_error: Option<String>,
    query_error: Option<String>,
    update_error: Option<String>,
    calls: Vec<MockCall>,
}

/// In-memory backend for tests.
///
/// Behaves like the upcoming view: rows whose `done` flag is set by
/// `update_row` drop out of later query results. Each operation can be
/// made to fail with a fixed message.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the rows the view returns, in server order.
    pub fn with_rows(self, rows: Vec<Task>) -> Self {
        self.lock().rows = rows;
        self
    }

    pub fn with_session(self, session: Session) -> Self {
        self.lock().session = Some(session);
        self
    }

    pub fn set_rows(&self, rows: Vec<Task>) {
        self.lock().rows = rows;
    }

    pub fn fail_session(&self, message: Option<&str>) {
        self.lock().session_error = message.map(String::from);
    }

    pub fn fail_sign_in(&self, message: Option<&str>) {
        self.lock().sign_in_error = message.map(String::from);
    }

    pub fn fail_sign_out(&self, message: Option<&str>) {
        self.lock().sign_out_error = message.map(String::from);
    }

    pub fn fail_query(&self, message: Option<&str>) {
        self.lock().query_error = message.map(String::from);
    }

    pub fn fail_update(&self, message: Option<&str>) {
        self.lock().update_error = message.map(String::from);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn get_session(&self, location: Option<&str>) -> Result<Option<Session>, ServiceError> {
        let mut state = self.lock();
        state.calls.push(MockCall::GetSession {
            location: location.map(String::from),
        });
        if let Some(msg) = &state.session_error {
            return Err(ServiceError::Auth(msg.clone()));
        }
        if let Some(location) = location {
            if let Some(session) = Session::from_location(location)? {
                state.session = Some(session);
            }
        }
        Ok(state.session.clone())
    }

    async fn sign_in_with_otp(&self, email: &str, redirect_to: &str) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.calls.push(MockCall::SignInWithOtp {
            email: email.to_string(),
            redirect_to: redirect_to.to_string(),
        });
        match &state.sign_in_error {
            Some(msg) => Err(ServiceError::Auth(msg.clone())),
            None => Ok(()),
        }
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.calls.push(MockCall::SignOut);
        state.session = None;
        match &state.sign_out_error {
            Some(msg) => Err(ServiceError::Auth(msg.clone())),
            None => Ok(()),
        }
    }

    async fn query_rows(&self, query: &TaskQuery) -> Result<Vec<Task>, ServiceError> {
        let mut state = self.lock();
        state.calls.push(MockCall::QueryRows(query.clone()));
        if let Some(msg) = &state.query_error {
            return Err(ServiceError::Query(msg.clone()));
        }
        Ok(state.rows.iter().filter(|t| !t.done).cloned().collect())
    }

    async fn update_row(
        &self,
        table: &str,
        id: &str,
        update: &TaskUpdate,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.calls.push(MockCall::UpdateRow {
            table: table.to_string(),
            id: id.to_string(),
            update: update.clone(),
        });
        if let Some(msg) = &state.update_error {
            return Err(ServiceError::Query(msg.clone()));
        }
        if let (Some(done), Some(row)) = (update.done, state.rows.iter_mut().find(|t| t.id == id)) {
            row.done = done;
        }
        Ok(())
    }
}
