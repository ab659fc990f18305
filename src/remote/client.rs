// SPDX-License-Identifier: MPL-2.0

use crate::config::{PROBE_TIMEOUT, RemoteConfig};
use crate::remote::RemoteError;
use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Thin wrapper over the hosted database's row endpoints.
///
/// Tables are reached at `{base}/rest/v1/{table}` with PostgREST-style
/// filter parameters. The rest of the crate only sees rows as
/// `serde_json::Value`; typed decoding happens at the store layer.
pub struct RemoteClient {
    http: reqwest::Client,
    config: RemoteConfig,
}

impl RemoteClient {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Whether the remote answers at all: a HEAD to the REST root raced
    /// against a hard 2-second timer. Used once at startup to decide if
    /// remote calls are worth attempting.
    pub async fn probe(&self) -> bool {
        let url = match self.table_url("") {
            Ok(url) => url,
            Err(_) => return false,
        };
        let request = self.authed(self.http.head(url));
        match tokio::time::timeout(PROBE_TIMEOUT, request.send()).await {
            Ok(Ok(resp)) => resp.status().is_success() || resp.status().is_client_error(),
            Ok(Err(e)) => {
                debug!("connectivity probe failed: {}", e);
                false
            }
            Err(_) => {
                debug!("connectivity probe timed out");
                false
            }
        }
    }

    /// Select rows matching PostgREST-style filters, e.g.
    /// `[("user_id", "eq.u_123")]`.
    pub async fn select_rows(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<Value>, RemoteError> {
        let url = self.table_url(table)?;
        let resp = self
            .authed(self.http.get(url).query(filters))
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let resp = Self::check(resp).await?;
        let rows: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        Ok(rows)
    }

    pub async fn insert_row(&self, table: &str, row: &Value) -> Result<(), RemoteError> {
        let url = self.table_url(table)?;
        let resp = self
            .authed(self.http.post(url).json(row))
            .header("Prefer", "return=minimal")
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Self::check(resp).await?;
        Ok(())
    }

    /// Insert a batch, merging on primary-key conflicts.
    pub async fn upsert_rows(&self, table: &str, rows: &[Value]) -> Result<(), RemoteError> {
        let url = self.table_url(table)?;
        let resp = self
            .authed(self.http.post(url).json(rows))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Self::check(resp).await?;
        Ok(())
    }

    /// Update the row with the given id. Matching zero rows is the
    /// data-integrity case and comes back as `NotFound`.
    pub async fn update_row(&self, table: &str, id: &str, patch: &Value) -> Result<(), RemoteError> {
        let url = self.table_url(table)?;
        let resp = self
            .authed(
                self.http
                    .patch(url)
                    .query(&[("id", format!("eq.{}", id))])
                    .json(patch),
            )
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let resp = Self::check(resp).await?;
        let rows: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        if rows.is_empty() {
            return Err(RemoteError::NotFound);
        }
        Ok(())
    }

    /// Update all rows matching the filters. Zero matches is fine here.
    pub async fn update_rows(
        &self,
        table: &str,
        filters: &[(&str, &str)],
        patch: &Value,
    ) -> Result<(), RemoteError> {
        let url = self.table_url(table)?;
        let resp = self
            .authed(self.http.patch(url).query(filters).json(patch))
            .header("Prefer", "return=minimal")
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Self::check(resp).await?;
        Ok(())
    }

    /// Delete by id. Deleting an absent row is treated as success.
    pub async fn delete_row(&self, table: &str, id: &str) -> Result<(), RemoteError> {
        let url = self.table_url(table)?;
        let resp = self
            .authed(
                self.http
                    .delete(url)
                    .query(&[("id", format!("eq.{}", id))]),
            )
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Self::check(resp).await?;
        Ok(())
    }

    fn table_url(&self, table: &str) -> Result<Url, RemoteError> {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/rest/v1/{}", base, table))
            .map_err(|e| RemoteError::InvalidResponse(format!("bad table url: {}", e)))
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(RemoteError::Status {
            code: status.as_u16(),
            message,
        })
    }
}
