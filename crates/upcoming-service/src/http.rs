use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use upcoming_core::task::{Task, TaskQuery, TaskUpdate};
use url::Url;

use crate::session::TokenResponse;
use crate::{Backend, ServiceError, Session};

/// Supabase client: GoTrue under `/auth/v1`, PostgREST under `/rest/v1`.
///
/// Holds the current session internally. Data requests are authorized with
/// the session's access token when there is one, and the anon key otherwise.
/// A session at or near expiry is refreshed before it is used.
pub struct HttpBackend {
    base_url: String,
    anon_key: String,
    client: Client,
    session: RwLock<Option<Session>>,
    /// Held while a refresh is in flight so concurrent requests share it.
    refresh_lock: Mutex<()>,
}

impl HttpBackend {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            base_url,
            anon_key: anon_key.to_string(),
            client: Client::new(),
            session: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Replace the stored session, e.g. with one saved from an earlier run.
    pub async fn restore_session(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }

    /// The stored session, refreshed first if it has expired.
    ///
    /// An expired session that cannot be refreshed is cleared and reported
    /// as an `Auth` error.
    async fn fresh_session(&self) -> Result<Option<Session>, ServiceError> {
        match self.current_session().await {
            Some(current) if current.is_expired(Utc::now()) => {}
            other => return Ok(other),
        }

        let _guard = self.refresh_lock.lock().await;
        // Another request may have refreshed while we waited.
        let current = match self.current_session().await {
            Some(current) if current.is_expired(Utc::now()) => current,
            other => return Ok(other),
        };

        let Some(refresh_token) = current.refresh_token.as_deref() else {
            warn!("session expired without a refresh token");
            *self.session.write().await = None;
            return Err(ServiceError::Auth("session expired".into()));
        };
        debug!("refreshing expired session");
        match self.refresh(refresh_token).await {
            Ok(session) => {
                info!(email = ?session.email, "session refreshed");
                *self.session.write().await = Some(session.clone());
                Ok(Some(session))
            }
            Err(e) => {
                warn!("session refresh failed: {e}");
                *self.session.write().await = None;
                Err(e)
            }
        }
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, String> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| format!("invalid url: {e}"))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url)
    }

    fn with_anon(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", self.anon_key.as_str())
            .header("Authorization", format!("Bearer {}", self.anon_key))
    }

    async fn with_auth(&self, builder: RequestBuilder) -> Result<RequestBuilder, ServiceError> {
        let Some(session) = self.fresh_session().await? else {
            return Ok(self.with_anon(builder));
        };
        Ok(builder
            .header("apikey", self.anon_key.as_str())
            .header("Authorization", format!("Bearer {}", session.access_token)))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, ServiceError> {
        let url = self
            .url("/auth/v1/token", &[("grant_type", "refresh_token")])
            .map_err(ServiceError::Auth)?;
        let resp = self
            .with_anon(self.client.post(url))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| ServiceError::Auth(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ServiceError::Auth(error_message(resp).await));
        }
        let token = resp
            .json::<TokenResponse>()
            .await
            .map_err(|e| ServiceError::Auth(format!("json decode: {e}")))?;
        Ok(Session::from(token))
    }
}

async fn error_message(resp: Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    message_from_body(status, &body)
}

/// GoTrue reports `msg` (or `error_description`), PostgREST reports `message`.
fn message_from_body(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["msg", "message", "error_description", "error"]
                .iter()
                .find_map(|key| v[*key].as_str().map(String::from))
        })
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.to_string()
            }
        })
}

#[async_trait]
impl Backend for HttpBackend {
    async fn get_session(&self, location: Option<&str>) -> Result<Option<Session>, ServiceError> {
        if let Some(location) = location {
            if let Some(session) = Session::from_location(location)? {
                info!(email = ?session.email, "session established from sign-in link");
                *self.session.write().await = Some(session);
            }
        }

        let session = self.fresh_session().await?;
        if session.is_none() {
            debug!("no session");
        }
        Ok(session)
    }

    async fn sign_in_with_otp(&self, email: &str, redirect_to: &str) -> Result<(), ServiceError> {
        let url = self
            .url("/auth/v1/otp", &[("redirect_to", redirect_to)])
            .map_err(ServiceError::Auth)?;
        let resp = self
            .with_anon(self.client.post(url))
            .json(&serde_json::json!({
                "email": email,
                "create_user": true,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Auth(e.to_string()))?;
        if resp.status().is_success() {
            info!("sign-in link requested");
            Ok(())
        } else {
            let msg = error_message(resp).await;
            warn!("sign-in link request failed: {msg}");
            Err(ServiceError::Auth(msg))
        }
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        // The local session goes away no matter what the server says.
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        let url = self
            .url("/auth/v1/logout", &[])
            .map_err(ServiceError::Auth)?;
        let resp = self
            .client
            .post(url)
            .header("apikey", self.anon_key.as_str())
            .header("Authorization", format!("Bearer {}", session.access_token))
            .send()
            .await
            .map_err(|e| ServiceError::Auth(e.to_string()))?;
        if resp.status().is_success() {
            info!("signed out");
            Ok(())
        } else {
            Err(ServiceError::Auth(error_message(resp).await))
        }
    }

    async fn query_rows(&self, query: &TaskQuery) -> Result<Vec<Task>, ServiceError> {
        let select = query.select_param();
        let order = query.order_param();
        let url = self
            .url(
                &format!("/rest/v1/{}", query.view),
                &[("select", select.as_str()), ("order", order.as_str())],
            )
            .map_err(ServiceError::Query)?;
        debug!(view = %query.view, %order, "querying rows");
        let resp = self
            .with_auth(self.client.get(url))
            .await?
            .send()
            .await
            .map_err(|e| ServiceError::Query(e.to_string()))?;
        if !resp.status().is_success() {
            let msg = error_message(resp).await;
            warn!(view = %query.view, "query failed: {msg}");
            return Err(ServiceError::Query(msg));
        }
        resp.json::<Vec<Task>>()
            .await
            .map_err(|e| ServiceError::Query(format!("json decode: {e}")))
    }

    async fn update_row(
        &self,
        table: &str,
        id: &str,
        update: &TaskUpdate,
    ) -> Result<(), ServiceError> {
        let filter = format!("eq.{id}");
        let url = self
            .url(&format!("/rest/v1/{table}"), &[("id", filter.as_str())])
            .map_err(ServiceError::Query)?;
        let builder = self
            .client
            .patch(url)
            .header("Prefer", "return=minimal")
            .json(update);
        let resp = self
            .with_auth(builder)
            .await?
            .send()
            .await
            .map_err(|e| ServiceError::Query(e.to_string()))?;
        if resp.status().is_success() {
            debug!(%table, %id, "row updated");
            Ok(())
        } else {
            let msg = error_message(resp).await;
            warn!(%table, %id, "update failed: {msg}");
            Err(ServiceError::Query(msg))
        }
    }
}
