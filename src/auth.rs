//! Password-grant token exchange with the identity service.
use crate::error::{Error, Result};
use serde_json::Value;
use std::fmt;
use tracing::debug;

pub const DEFAULT_TOKEN_URL: &str =
    "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token";
pub const DEFAULT_CLIENT_ID: &str = "cdse-public";

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opaque access token, valid for a single run.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

pub struct TokenProvider {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
}

impl TokenProvider {
    pub fn new(client: reqwest::Client, token_url: &str, client_id: &str) -> Self {
        Self {
            client,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
        }
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> Result<BearerToken> {
        debug!("Requesting access token for {}", credentials.username);

        let form = [
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
        ];
        let response = self
            .client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::AuthenticationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::AuthenticationFailed(format!(
                "identity service answered with status {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::AuthenticationFailed(e.to_string()))?;

        extract_access_token(&body)
    }
}

fn extract_access_token(body: &Value) -> Result<BearerToken> {
    match body.get("access_token") {
        Some(Value::String(token)) if !token.is_empty() => Ok(BearerToken::new(token.as_str())),
        Some(_) => Err(Error::AuthenticationFailed(
            "access_token is not a usable string".to_string(),
        )),
        None => Err(Error::AuthenticationFailed(
            "response carries no access_token".to_string(),
        )),
    }
}
