//! Authentication endpoints.
//!
//! [`AuthApi`] is the seam between the auth session manager and the wire:
//! the HTTP implementation lives here, tests drive the manager with fakes.
//! These endpoints use their own unauthenticated request path; only
//! `logout` carries a bearer token.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::api::{check, response_error};
use crate::error::Result;

/// A fresh token pair from a refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Tokens plus the server-declared "profile completion required" flag
/// returned by the login endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginGrant {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub profile_complete: bool,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Ask the server to email a one-time code to `identifier`.
    async fn send_code(&self, identifier: &str) -> Result<()>;

    /// Exchange `identifier` + code for a session.
    async fn verify_code(&self, identifier: &str, code: &str) -> Result<LoginGrant>;

    /// Credential-based login against the admin bypass endpoint.
    async fn admin_login(&self, username: &str, password: &str) -> Result<LoginGrant>;

    /// Exchange a refresh token for a fresh pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;

    /// Best-effort server-side session teardown.
    async fn logout(&self, access_token: &str) -> Result<()>;
}

pub struct HttpAuthApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_for<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        let resp = check(resp).await?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn send_code(&self, identifier: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url("/auth/email/login"))
            .json(&json!({ "email": identifier }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn verify_code(&self, identifier: &str, code: &str) -> Result<LoginGrant> {
        self.post_for(
            "/auth/email/login",
            &json!({ "email": identifier, "code": code }),
        )
        .await
    }

    async fn admin_login(&self, username: &str, password: &str) -> Result<LoginGrant> {
        self.post_for(
            "/admin/bypass-login",
            &json!({ "username": username, "password": password }),
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        self.post_for("/auth/refreshtoken", &json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn logout(&self, access_token: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url("/auth/logout"))
            .bearer_auth(access_token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(response_error(resp).await);
        }
        Ok(())
    }
}
