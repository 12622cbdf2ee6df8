use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;
use url::Url;

use crate::ServiceError;

/// Sessions this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    /// Taken from the access token's claims when present.
    pub email: Option<String>,
}

impl Session {
    /// Read a session out of the address a sign-in link redirected to.
    ///
    /// Tokens normally sit in the fragment
    /// (`#access_token=...&refresh_token=...&expires_in=3600&token_type=bearer`).
    /// The query string is consulted as well, since error redirects may use it.
    /// Returns `Ok(None)` when the address carries no token at all.
    pub fn from_location(location: &str) -> Result<Option<Session>, ServiceError> {
        let url = Url::parse(location.trim())
            .map_err(|e| ServiceError::Auth(format!("invalid sign-in link: {e}")))?;

        let mut params: HashMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if let Some(fragment) = url.fragment() {
            for (k, v) in url::form_urlencoded::parse(fragment.as_bytes()) {
                params.insert(k.into_owned(), v.into_owned());
            }
        }

        if let Some(description) = params
            .get("error_description")
            .or_else(|| params.get("error"))
        {
            return Err(ServiceError::Auth(description.clone()));
        }

        let Some(access_token) = params.get("access_token").filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let expires_at = expiry_from(
            params.get("expires_at").and_then(|v| v.parse().ok()),
            params.get("expires_in").and_then(|v| v.parse().ok()),
            Utc::now(),
        );

        Ok(Some(Session {
            email: email_claim(access_token),
            access_token: access_token.clone(),
            refresh_token: params.get("refresh_token").filter(|t| !t.is_empty()).cloned(),
            token_type: params
                .get("token_type")
                .cloned()
                .unwrap_or_else(|| "bearer".into()),
            expires_at,
        }))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at <= now + Duration::seconds(EXPIRY_MARGIN_SECS),
            None => false,
        }
    }
}

/// Body of a successful `/auth/v1/token` call.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub user: Option<TokenUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenUser {
    #[serde(default)]
    pub email: Option<String>,
}

impl From<TokenResponse> for Session {
    fn from(resp: TokenResponse) -> Self {
        let email = resp
            .user
            .and_then(|u| u.email)
            .or_else(|| email_claim(&resp.access_token));
        Session {
            expires_at: expiry_from(resp.expires_at, resp.expires_in, Utc::now()),
            email,
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            token_type: resp.token_type.unwrap_or_else(|| "bearer".into()),
        }
    }
}

fn expiry_from(
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match (expires_at, expires_in) {
        (Some(at), _) => Utc.timestamp_opt(at, 0).single(),
        (None, Some(secs)) => Some(now + Duration::seconds(secs)),
        (None, None) => None,
    }
}

/// Pull the `email` claim out of a JWT without verifying it.
/// The server verifies tokens; this is only used for display.
fn email_claim(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    claims["email"]
        .as_str()
        .filter(|e| !e.is_empty())
        .map(String::from)
}
