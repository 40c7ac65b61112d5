use reqwest::header::AUTHORIZATION;
use thiserror::Error;

use crate::api::{ApiContext, LOGIN_PATH, LoginPayload};
use crate::request::MonitorRequest;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider answered but did not hand out a token.
    #[error("login rejected: {0}")]
    Rejected(String),
    #[error("login request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Opaque bearer token. Not cached: a fresh one is obtained every cycle.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

/// Exchanges identity credentials for a bearer token.
#[derive(Clone, Debug)]
pub struct AuthClient {
    context: ApiContext,
}

impl AuthClient {
    pub fn new(context: ApiContext) -> Self {
        Self { context }
    }

    /// Log in and return the token from the `Authorization` response header.
    ///
    /// No retries; the caller decides what a failed login means.
    pub async fn get_token(&self, request: &MonitorRequest) -> Result<AuthToken, AuthError> {
        let url = self.context.url(LOGIN_PATH);
        tracing::debug!("Requesting token from {}", url);

        let response = self
            .context
            .client()
            .put(&url)
            .headers(self.context.headers())
            .json(&LoginPayload::from_request(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected(format!("status {status}")));
        }

        let token = response
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AuthError::Rejected("no authorization header in response".to_string()))?;

        Ok(AuthToken::new(token))
    }
}
