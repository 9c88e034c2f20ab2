//! File attachment download.

use std::time::Duration;

use bytes::Bytes;

use crate::{Result, client::RecbaseClient, config::FILE_TIMEOUT_SECS};

impl RecbaseClient {
    /// Downloads one file attachment by collection, record, and filename.
    ///
    /// This is a single GET with no retries. Callers treat a failure as a
    /// soft miss (the attachment is omitted from the export), never fatal.
    pub async fn download_file(
        &self,
        collection_id: &str,
        record_id: &str,
        filename: &str,
    ) -> Result<Bytes> {
        let path = format!("/api/files/{collection_id}/{record_id}/{filename}");
        self.get_bytes(&path, Duration::from_secs(FILE_TIMEOUT_SECS))
            .await
    }
}
