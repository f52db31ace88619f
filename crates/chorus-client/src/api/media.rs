use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use crate::api::ApiClient;
use crate::error::Result;

/// Handle to an uploaded media blob.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaRef {
    pub id: String,
}

impl ApiClient {
    /// Upload raw media bytes; the returned reference goes into a
    /// message's `content`.
    pub async fn upload_media(&self, file_name: &str, bytes: Vec<u8>) -> Result<MediaRef> {
        let url = self.url("/media");
        let resp = self
            .send_authorized(|http| {
                http.post(&url)
                    .query(&[("filename", file_name)])
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .body(bytes.clone())
            })
            .await?;
        Ok(resp.json().await?)
    }

    /// Resolve a media reference to a fetchable URL.
    pub fn media_url(&self, media_ref: &str) -> String {
        self.url(&format!("/media/{media_ref}"))
    }
}
