use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::Result;
use crate::api::ApiClient;
use crate::cache::{CacheKey, SharedCache};
use crate::types::{BatchSettings, FileDescriptor, OcrFileStatus, OcrText};
use crate::utils::http::send_checked_json;

/// Per-file OCR endpoints under `/api/ocr`.
#[derive(Debug, Clone)]
pub struct OcrClient {
    api: ApiClient,
    cache: Option<SharedCache<Value>>,
    status_ttl: Duration,
}

#[derive(Debug, Serialize)]
struct ProcessFileRequest<'a> {
    file_id: &'a str,
    drive_id: &'a str,
    settings: &'a BatchSettings,
}

impl OcrClient {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            cache: None,
            status_ttl: Duration::from_secs(30),
        }
    }

    pub fn with_cache(mut self, cache: SharedCache<Value>, status_ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.status_ttl = status_ttl;
        self
    }

    fn status_key(file_id: &str) -> CacheKey {
        CacheKey::new("ocr_status").with("file", file_id)
    }

    pub async fn file_status(&self, file_id: &str) -> Result<OcrFileStatus> {
        let key = match &self.cache {
            Some(cache) => {
                let mut cache = cache.lock().await;
                let key = cache.scoped_key(&Self::status_key(file_id));
                if let Some(hit) = cache.get(&key) {
                    return Ok(serde_json::from_value(hit)?);
                }
                Some(key)
            }
            None => None,
        };

        let req = self.api.get(&["ocr", "status", file_id])?;
        let raw: Value = send_checked_json(req).await?;
        let status = serde_json::from_value::<OcrFileStatus>(raw.clone())?;
        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.lock().await.set(key, raw, self.status_ttl);
        }
        Ok(status)
    }

    pub async fn text(&self, file_id: &str) -> Result<OcrText> {
        let req = self.api.get(&["ocr", "text", file_id])?;
        send_checked_json(req).await
    }

    /// Runs OCR on one file outside any batch. Waits up to the configured OCR timeout.
    pub async fn process_file(
        &self,
        file: &FileDescriptor,
        settings: &BatchSettings,
    ) -> Result<OcrFileStatus> {
        let body = ProcessFileRequest {
            file_id: &file.id,
            drive_id: &file.drive_id,
            settings,
        };
        let req = self
            .api
            .post(&["ocr", "process"])?
            .timeout(self.api.ocr_timeout())
            .json(&body);
        tracing::info!(file = %file.name, "submitting file for ocr");
        let status = send_checked_json(req).await?;

        if let Some(cache) = &self.cache {
            let mut cache = cache.lock().await;
            let key = cache.scoped_key(&Self::status_key(&file.id));
            cache.remove(&key);
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{TtlCache, shared};
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn status_uses_path_form_and_is_cached() -> Result<()> {
        if crate::utils::test_support::mock_server_unavailable() {
            return Ok(());
        }

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ocr/status/file-1");
                then.status(200).json_body(json!({
                    "file_id": "file-1",
                    "status": "completed",
                    "progress": 1.0
                }));
            })
            .await;

        let cache = shared(TtlCache::new("ocr", Duration::from_secs(60)));
        let client = OcrClient::new(ApiClient::new(&server.base_url())?)
            .with_cache(cache.clone(), Duration::from_secs(10));

        assert_eq!(client.file_status("file-1").await?.status, "completed");
        assert_eq!(client.file_status("file-1").await?.progress, Some(1.0));
        mock.assert_hits_async(1).await;
        assert!(cache.lock().await.contains_key("ocr:ocr_status|file:file-1"));
        Ok(())
    }

    #[tokio::test]
    async fn process_file_posts_and_drops_cached_status() -> Result<()> {
        if crate::utils::test_support::mock_server_unavailable() {
            return Ok(());
        }

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/ocr/process")
                    .body_includes("\"file_id\":\"file-1\"")
                    .body_includes("\"drive_id\":\"d1\"");
                then.status(200)
                    .json_body(json!({ "file_id": "file-1", "status": "processing" }));
            })
            .await;

        let cache = shared(TtlCache::new("ocr", Duration::from_secs(60)));
        cache.lock().await.set_default(
            "ocr:ocr_status|file:file-1",
            json!({ "file_id": "file-1", "status": "pending" }),
        );
        let client = OcrClient::new(ApiClient::new(&server.base_url())?)
            .with_cache(cache.clone(), Duration::from_secs(10));

        let file = FileDescriptor {
            id: "file-1".to_string(),
            name: "a.pdf".to_string(),
            drive_id: "d1".to_string(),
            parent_folder_id: None,
        };
        let status = client.process_file(&file, &BatchSettings::default()).await?;
        mock.assert_async().await;
        assert_eq!(status.status, "processing");
        assert!(cache.lock().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn text_is_returned() -> Result<()> {
        if crate::utils::test_support::mock_server_unavailable() {
            return Ok(());
        }

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/ocr/text/file-2");
                then.status(200).json_body(json!({
                    "file_id": "file-2",
                    "text": "Invoice 42",
                    "page_count": 1
                }));
            })
            .await;

        let client = OcrClient::new(ApiClient::new(&server.base_url())?);
        let text = client.text("file-2").await?;
        assert_eq!(text.text, "Invoice 42");
        assert_eq!(text.page_count, Some(1));
        Ok(())
    }
}
