use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::ApiClient;
use crate::cache::{CacheKey, SharedCache};
use crate::expansion::RecursiveLister;
use crate::types::{DriveFile, Folder, Library, RecursiveListing};
use crate::utils::http::{send_checked_bytes, send_checked_json};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentMode {
    /// `download=1`: the raw file as an attachment.
    Download,
    /// `preview=true`: inline rendering.
    Preview,
}

/// Explorer endpoints under `/api/sharepoint`.
#[derive(Debug, Clone)]
pub struct SharePointClient {
    api: ApiClient,
    cache: Option<SharedCache<Value>>,
}

impl SharePointClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api, cache: None }
    }

    /// Serves library, folder and file listings from `cache` while entries are fresh.
    pub fn with_cache(mut self, cache: SharedCache<Value>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn libraries(&self) -> Result<Vec<Library>> {
        let req = self.api.get(&["sharepoint", "libraries"])?;
        self.cached_json(CacheKey::new("libraries"), req).await
    }

    pub async fn folders(&self, drive_id: &str, parent_id: Option<&str>) -> Result<Vec<Folder>> {
        let req = self.listing_request("folders", drive_id, parent_id)?;
        let key = CacheKey::new("folders").drive(drive_id).parent(parent_id);
        self.cached_json(key, req).await
    }

    pub async fn files(&self, drive_id: &str, parent_id: Option<&str>) -> Result<Vec<DriveFile>> {
        let req = self.listing_request("files", drive_id, parent_id)?;
        let key = CacheKey::new("files").drive(drive_id).parent(parent_id);
        self.cached_json(key, req).await
    }

    /// Every file below `folder_id` (the library root when `None`), filtered by extension server-side.
    pub async fn list_files_recursive(
        &self,
        library_id: &str,
        folder_id: Option<&str>,
        file_type: &str,
    ) -> Result<Vec<DriveFile>> {
        let mut query = vec![("libraryId", library_id), ("fileType", file_type)];
        if let Some(folder_id) = folder_id {
            query.push(("folderId", folder_id));
        }
        let req = self
            .api
            .get(&["sharepoint", "list_files_recursive"])?
            .query(&query);
        let listing: RecursiveListing = send_checked_json(req).await?;
        Ok(listing.files)
    }

    pub async fn file_content(
        &self,
        drive_id: &str,
        item_id: &str,
        mode: ContentMode,
    ) -> Result<Bytes> {
        let mode_param = match mode {
            ContentMode::Download => ("download", "1"),
            ContentMode::Preview => ("preview", "true"),
        };
        let req = self
            .api
            .get(&["sharepoint", "file_content"])?
            .query(&[("drive_id", drive_id), ("item_id", item_id), mode_param]);
        send_checked_bytes(req).await
    }

    /// Drops cached folder and file listings of one drive. Returns the number of entries removed.
    pub async fn invalidate_drive(&self, drive_id: &str) -> usize {
        let Some(cache) = &self.cache else {
            return 0;
        };
        let mut cache = cache.lock().await;
        ["folders", "files"]
            .into_iter()
            .map(|kind| cache.invalidate_by_pattern(&CacheKey::drive_pattern(kind, drive_id)))
            .sum()
    }

    fn listing_request(
        &self,
        kind: &str,
        drive_id: &str,
        parent_id: Option<&str>,
    ) -> Result<reqwest::RequestBuilder> {
        if drive_id.trim().is_empty() {
            return Err(Error::InvalidRequest("drive_id must not be empty".to_string()));
        }
        let mut req = self
            .api
            .get(&["sharepoint", kind])?
            .query(&[("drive_id", drive_id)]);
        if let Some(parent_id) = parent_id.filter(|id| !id.trim().is_empty()) {
            req = req.query(&[("parent_id", parent_id)]);
        }
        Ok(req)
    }

    async fn cached_json<T: DeserializeOwned>(
        &self,
        key: CacheKey,
        req: reqwest::RequestBuilder,
    ) -> Result<T> {
        let Some(cache) = &self.cache else {
            return send_checked_json(req).await;
        };

        let (storage_key, hit) = {
            let mut cache = cache.lock().await;
            let storage_key = cache.scoped_key(&key);
            let hit = cache.get(&storage_key);
            (storage_key, hit)
        };
        if let Some(hit) = hit {
            tracing::debug!(key = %storage_key, "cache hit");
            return Ok(serde_json::from_value(hit)?);
        }

        let raw: Value = send_checked_json(req).await?;
        let parsed = serde_json::from_value::<T>(raw.clone())?;
        cache.lock().await.set_default(storage_key, raw);
        Ok(parsed)
    }
}

#[async_trait]
impl RecursiveLister for SharePointClient {
    async fn list_pdf_files(&self, library_id: &str, folder_id: &str) -> Result<Vec<DriveFile>> {
        self.list_files_recursive(library_id, Some(folder_id), "pdf")
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::{TtlCache, shared};
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn libraries_are_served_from_cache_while_fresh() -> Result<()> {
        if crate::utils::test_support::mock_server_unavailable() {
            return Ok(());
        }

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/sharepoint/libraries");
                then.status(200).json_body(json!([
                    { "id": "lib-1", "name": "Documents", "description": "Shared docs" }
                ]));
            })
            .await;

        let cache = shared(TtlCache::new("sp", Duration::from_secs(60)));
        let client = SharePointClient::new(ApiClient::new(&server.base_url())?).with_cache(cache.clone());

        let first = client.libraries().await?;
        let second = client.libraries().await?;
        assert_eq!(first, second);
        assert_eq!(first[0].name, "Documents");
        mock.assert_hits_async(1).await;
        assert!(cache.lock().await.contains_key("sp:libraries"));
        Ok(())
    }

    #[tokio::test]
    async fn folder_listing_passes_drive_and_parent() -> Result<()> {
        if crate::utils::test_support::mock_server_unavailable() {
            return Ok(());
        }

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/sharepoint/folders")
                    .query_param("drive_id", "d1")
                    .query_param("parent_id", "p1");
                then.status(200)
                    .json_body(json!([{ "id": "f1", "name": "Invoices", "child_count": 4 }]));
            })
            .await;

        let cache = shared(TtlCache::new("sp", Duration::from_secs(60)));
        let client = SharePointClient::new(ApiClient::new(&server.base_url())?).with_cache(cache.clone());
        let folders = client.folders("d1", Some("p1")).await?;
        mock.assert_async().await;
        assert_eq!(folders[0].child_count, Some(4));

        assert_eq!(client.invalidate_drive("d1").await, 1);
        assert!(cache.lock().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn recursive_listing_uses_camel_case_query() -> Result<()> {
        if crate::utils::test_support::mock_server_unavailable() {
            return Ok(());
        }

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/sharepoint/list_files_recursive")
                    .query_param("libraryId", "lib-1")
                    .query_param("folderId", "fold-2")
                    .query_param("fileType", "pdf");
                then.status(200).json_body(json!({
                    "files": [{ "id": "x1", "name": "a.pdf" }, { "id": "x2", "name": "b.pdf" }]
                }));
            })
            .await;

        let client = SharePointClient::new(ApiClient::new(&server.base_url())?);
        let files = client.list_pdf_files("lib-1", "fold-2").await?;
        mock.assert_async().await;
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn file_content_download_returns_bytes() -> Result<()> {
        if crate::utils::test_support::mock_server_unavailable() {
            return Ok(());
        }

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/sharepoint/file_content")
                    .query_param("drive_id", "d1")
                    .query_param("item_id", "i1")
                    .query_param("download", "1");
                then.status(200).body("%PDF-1.7");
            })
            .await;

        let client = SharePointClient::new(ApiClient::new(&server.base_url())?);
        let bytes = client.file_content("d1", "i1", ContentMode::Download).await?;
        mock.assert_async().await;
        assert_eq!(bytes.as_ref(), b"%PDF-1.7");
        Ok(())
    }

    #[tokio::test]
    async fn empty_drive_id_is_rejected_before_sending() -> Result<()> {
        let client = SharePointClient::new(ApiClient::new("http://127.0.0.1:9")?);
        let err = client.files(" ", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)), "{err}");
        Ok(())
    }
}
