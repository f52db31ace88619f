use serde::Serialize;

use chorus_shared::types::{User, UserId};

use crate::api::ApiClient;
use crate::error::Result;

/// Fields of the caller's own profile that can be changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

impl ApiClient {
    pub async fn fetch_me(&self) -> Result<User> {
        self.get_json("/users/me", &[]).await
    }

    pub async fn fetch_user(&self, id: UserId) -> Result<User> {
        self.get_json(&format!("/users/{id}"), &[]).await
    }

    pub async fn fetch_user_by_email(&self, email: &str) -> Result<User> {
        self.get_json("/users/lookup", &[("email", email.to_string())])
            .await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        self.post_json("/users/me", update).await
    }
}
