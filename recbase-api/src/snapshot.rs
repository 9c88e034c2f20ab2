//! Server-side full-database snapshots.
//!
//! The store can produce a whole-datastore backup with its own native
//! mechanism, independent of per-tenant export. This module wraps the
//! trigger/download/upload endpoints. Snapshot names embed a sortable
//! timestamp so the lexicographically greatest name is the most recent.

use std::{path::Path, time::Duration};

use bytes::Bytes;
use chrono::Local;
use reqwest::Method;
use snafu::prelude::*;
use tracing::debug;

use crate::{
    Result,
    client::RecbaseClient,
    config::{SNAPSHOT_DOWNLOAD_TIMEOUT_SECS, SNAPSHOT_TRIGGER_TIMEOUT_SECS},
    error::{HttpSnafu, RecbaseError},
};

/// Returns a snapshot name for the current time: `auto_{YYYYmmdd_HHMM}.zip`
pub fn snapshot_name_now() -> String {
    format!("auto_{}.zip", Local::now().format("%Y%m%d_%H%M"))
}

impl RecbaseClient {
    /// Triggers creation of a named server-side snapshot.
    pub async fn create_snapshot(&self, name: &str) -> Result<()> {
        let response = self
            .send_raw(
                Method::POST,
                "/api/backups",
                &[],
                Some(serde_json::json!({ "name": name })),
                Some(Duration::from_secs(SNAPSHOT_TRIGGER_TIMEOUT_SECS)),
            )
            .await?;
        debug!(name, status = response.status().as_u16(), "snapshot created");
        Ok(())
    }

    /// Downloads a named snapshot.
    pub async fn download_snapshot(&self, name: &str) -> Result<Bytes> {
        let path = format!("/api/backups/{name}");
        self.get_bytes(&path, Duration::from_secs(SNAPSHOT_DOWNLOAD_TIMEOUT_SECS))
            .await
    }

    /// Uploads a previously downloaded snapshot archive back to the store.
    ///
    /// The endpoint requires multipart form upload. This only stages the
    /// snapshot on the server; applying it is a separate, irreversible call
    /// that the caller must confirm out of band.
    pub async fn upload_snapshot(&self, local_path: &Path) -> Result<()> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RecbaseError::Other {
                message: format!("snapshot path has no file name: {}", local_path.display()),
            })?
            .to_string();
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| RecbaseError::Other {
                message: format!("read snapshot {}: {e}", local_path.display()),
            })?;
        let token = self.bearer()?;
        let url = format!("{}/api/backups/upload", self.config.base_url);
        let part = reqwest::multipart::Part::bytes(data).file_name(name.clone());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .multipart(form)
            .timeout(Duration::from_secs(SNAPSHOT_TRIGGER_TIMEOUT_SECS))
            .send()
            .await
            .context(HttpSnafu {
                method: "POST",
                url: &url,
            })?;
        let code = response.status();
        if !code.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RecbaseError::Api {
                code: code.as_u16(),
                method: "POST".to_string(),
                url,
                message,
            });
        }
        debug!(name, "snapshot uploaded");
        Ok(())
    }
}
