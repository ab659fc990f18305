// SPDX-License-Identifier: MPL-2.0

use crate::config::RemoteConfig;
use crate::remote::RemoteError;
use url::Url;

/// Object-storage client for post and listing images.
///
/// Objects live in a single public bucket at
/// `{base}/storage/v1/object/{bucket}/{name}`; the URL stored on a post
/// is the public read form of the same path.
pub struct BucketClient {
    http: reqwest::Client,
    config: RemoteConfig,
}

impl BucketClient {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Upload image bytes and return the public URL to store on the
    /// record. Overwrites an existing object of the same name.
    pub async fn upload_image(
        &self,
        name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> Result<String, RemoteError> {
        let url = self.object_url(name)?;
        let resp = self
            .http
            .post(url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header("Content-Type", mime_type.to_string())
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                code: status.as_u16(),
                message,
            });
        }

        Ok(self.public_url(name)?.to_string())
    }

    pub async fn remove_image(&self, name: &str) -> Result<(), RemoteError> {
        let url = self.object_url(name)?;
        let resp = self
            .http
            .delete(url)
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                code: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    /// Recover the object name from a stored public URL, if the URL
    /// points into this bucket.
    pub fn object_name(&self, image_url: &str) -> Option<String> {
        let marker = format!("/storage/v1/object/public/{}/", self.config.bucket);
        let (_, name) = image_url.split_once(&marker)?;
        if name.is_empty() {
            return None;
        }
        Some(name.to_string())
    }

    fn object_url(&self, name: &str) -> Result<Url, RemoteError> {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!(
            "{}/storage/v1/object/{}/{}",
            base, self.config.bucket, name
        ))
        .map_err(|e| RemoteError::InvalidResponse(format!("bad object url: {}", e)))
    }

    fn public_url(&self, name: &str) -> Result<Url, RemoteError> {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!(
            "{}/storage/v1/object/public/{}/{}",
            base, self.config.bucket, name
        ))
        .map_err(|e| RemoteError::InvalidResponse(format!("bad object url: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket() -> BucketClient {
        BucketClient::new(RemoteConfig::new("https://db.example.com", "anon-key").unwrap())
    }

    #[test]
    fn test_object_name_roundtrip() {
        let bucket = bucket();
        let url = bucket.public_url("p1.jpg").unwrap().to_string();
        assert_eq!(
            url,
            "https://db.example.com/storage/v1/object/public/plushie-images/p1.jpg"
        );
        assert_eq!(bucket.object_name(&url).as_deref(), Some("p1.jpg"));
    }

    #[test]
    fn test_object_name_rejects_foreign_urls() {
        let bucket = bucket();
        assert!(bucket.object_name("https://elsewhere.example/img.jpg").is_none());
        assert!(
            bucket
                .object_name("https://db.example.com/storage/v1/object/public/other-bucket/x.jpg")
                .is_none()
        );
    }
}
