//! REST surface of the backend.
//!
//! [`ApiClient`] owns the authorized-request core: every call attaches the
//! current bearer token, and a 401/403 answer triggers the single-flight
//! refresh followed by exactly one retry.  A retry that still fails ends
//! the session.  Domain endpoints live in the submodules as `impl`
//! blocks on [`ApiClient`].

pub mod auth;
pub mod contacts;
pub mod conversations;
pub mod media;
pub mod messages;
pub mod users;

use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::AuthManager;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::tokens::TokenStore;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenStore>,
    auth: Arc<AuthManager>,
}

impl ApiClient {
    pub fn new(
        config: &ClientConfig,
        http: reqwest::Client,
        tokens: Arc<TokenStore>,
        auth: Arc<AuthManager>,
    ) -> Self {
        Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            tokens,
            auth,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Run an authorized request.
    ///
    /// On 401/403 the access token is refreshed (single-flight, shared with
    /// every other caller) and the request retried exactly once.  A retry
    /// that is still rejected ends the session.
    pub(crate) async fn send_authorized<F>(&self, make: F) -> Result<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let token = self.tokens.access_token().ok_or(ClientError::Unauthorized)?;
        let resp = make(&self.http).bearer_auth(&token).send().await?;
        if !auth_rejected(resp.status()) {
            return check(resp).await;
        }

        let fresh = self
            .auth
            .refresh()
            .await
            .map_err(|_| ClientError::Unauthorized)?;
        let retry = make(&self.http).bearer_auth(&fresh).send().await?;
        if auth_rejected(retry.status()) {
            self.auth.session_expired();
            return Err(ClientError::Unauthorized);
        }
        check(retry).await
    }

    pub(crate) async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let resp = self
            .send_authorized(|http| http.get(&url).query(query))
            .await?;
        Ok(resp.json().await?)
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let resp = self
            .send_authorized(|http| http.post(&url).json(body))
            .await?;
        Ok(resp.json().await?)
    }

    pub(crate) async fn post_empty<B>(&self, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        self.send_authorized(|http| http.post(&url).json(body))
            .await?;
        Ok(())
    }

    pub(crate) async fn delete_json<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let resp = self.send_authorized(|http| http.delete(&url)).await?;
        Ok(resp.json().await?)
    }
}

fn auth_rejected(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Map a non-success response to the error taxonomy.
pub(crate) async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(response_error(resp).await)
}

pub(crate) async fn response_error(resp: reqwest::Response) -> ClientError {
    let status = resp.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized,
        StatusCode::NOT_FOUND => ClientError::NotFound,
        _ => {
            let message = resp.text().await.unwrap_or_default();
            ClientError::Server {
                status: status.as_u16(),
                message,
            }
        }
    }
}
