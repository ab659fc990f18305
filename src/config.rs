// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;
use url::Url;

pub const APP_ID: &str = "net.softspot.Store";
pub const APP_NAME: &str = "SoftSpot";

/// Default object-storage bucket for listing and post images
pub const DEFAULT_BUCKET: &str = "plushie-images";

/// Hard ceiling on the connectivity probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub const ENV_REMOTE_URL: &str = "SOFTSPOT_REMOTE_URL";
pub const ENV_REMOTE_KEY: &str = "SOFTSPOT_REMOTE_KEY";
pub const ENV_REMOTE_BUCKET: &str = "SOFTSPOT_REMOTE_BUCKET";

/// Connection parameters for the hosted database and object storage.
///
/// Constructed once at startup. When this is absent the store runs
/// local-only and no call site ever inspects the environment again.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: Url,
    pub api_key: String,
    pub bucket: String,
}

impl RemoteConfig {
    /// Build a config, rejecting empty or unparseable parameters.
    pub fn new(base_url: &str, api_key: &str) -> Option<Self> {
        if base_url.trim().is_empty() || api_key.trim().is_empty() {
            return None;
        }
        let base_url = match Url::parse(base_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("ignoring malformed remote URL: {}", e);
                return None;
            }
        };
        Some(Self {
            base_url,
            api_key: api_key.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
        })
    }

    /// Read connection parameters from the environment. Returns `None`
    /// unless both the URL and key are present; this is the predicate
    /// that gates every remote code path.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var(ENV_REMOTE_URL).ok()?;
        let key = std::env::var(ENV_REMOTE_KEY).ok()?;
        let mut config = Self::new(&url, &key)?;
        if let Ok(bucket) = std::env::var(ENV_REMOTE_BUCKET)
            && !bucket.trim().is_empty()
        {
            config.bucket = bucket;
        }
        Some(config)
    }

    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.bucket = bucket.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_parameters_rejected() {
        assert!(RemoteConfig::new("", "key").is_none());
        assert!(RemoteConfig::new("https://db.example.com", "").is_none());
        assert!(RemoteConfig::new("   ", "key").is_none());
    }

    #[test]
    fn test_malformed_url_rejected() {
        assert!(RemoteConfig::new("not a url", "key").is_none());
    }

    #[test]
    fn test_valid_config() {
        let config = RemoteConfig::new("https://db.example.com", "anon-key").unwrap();
        assert_eq!(config.base_url.as_str(), "https://db.example.com/");
        assert_eq!(config.bucket, DEFAULT_BUCKET);

        let config = config.with_bucket("other-bucket");
        assert_eq!(config.bucket, "other-bucket");
    }
}
