use serde::Deserialize;
use serde_json::{Value, json};

use crate::Result;
use crate::api::ApiClient;
use crate::types::{BackendCacheStats, Block, Setting};
use crate::utils::http::send_checked_json;

/// Lists arrive either bare or wrapped in an object, depending on the backend version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "settings", alias = "blocks", alias = "items")]
        data: Vec<T>,
    },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(items) | Listing::Wrapped { data: items } => items,
        }
    }
}

/// Backend cache management plus the settings and blocks stores.
#[derive(Debug, Clone)]
pub struct AdminClient {
    api: ApiClient,
}

impl AdminClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn cache_stats(&self) -> Result<BackendCacheStats> {
        send_checked_json(self.api.get(&["cache", "stats"])?).await
    }

    pub async fn clear_cache(&self) -> Result<Value> {
        send_checked_json(self.api.post(&["cache", "clear"])?).await
    }

    /// All settings, or only those in `category` (matched case-insensitively, client-side).
    pub async fn settings(&self, category: Option<&str>) -> Result<Vec<Setting>> {
        let listing: Listing<Setting> =
            send_checked_json(self.api.get(&["settings", "settings"])?).await?;
        let mut settings = listing.into_vec();
        if let Some(category) = category {
            settings.retain(|setting| {
                setting
                    .category
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(category))
            });
        }
        Ok(settings)
    }

    pub async fn setting(&self, id: &str) -> Result<Setting> {
        send_checked_json(self.api.get(&["settings", "settings", id])?).await
    }

    pub async fn update_setting(&self, id: &str, value: Value) -> Result<Setting> {
        let req = self
            .api
            .put(&["settings", "settings", id])?
            .json(&json!({ "value": value }));
        send_checked_json(req).await
    }

    pub async fn blocks(&self) -> Result<Vec<Block>> {
        let listing: Listing<Block> =
            send_checked_json(self.api.get(&["blocks", "blocks"])?).await?;
        Ok(listing.into_vec())
    }

    pub async fn block(&self, id: &str) -> Result<Block> {
        send_checked_json(self.api.get(&["blocks", "blocks", id])?).await
    }

    pub async fn update_block(&self, id: &str, content: Value) -> Result<Block> {
        let req = self
            .api
            .put(&["blocks", "blocks", id])?
            .json(&json!({ "content": content }));
        send_checked_json(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST, PUT};
    use httpmock::MockServer;

    #[test]
    fn listings_accept_bare_and_wrapped_arrays() {
        let bare: Listing<Block> =
            serde_json::from_value(json!([{ "id": "b1", "content": "x" }])).expect("bare");
        assert_eq!(bare.into_vec().len(), 1);

        let wrapped: Listing<Setting> = serde_json::from_value(json!({
            "settings": [{ "id": "s1", "value": 1 }, { "id": "s2", "value": 2 }]
        }))
        .expect("wrapped");
        assert_eq!(wrapped.into_vec().len(), 2);
    }

    #[tokio::test]
    async fn settings_are_filtered_by_category() -> Result<()> {
        if crate::utils::test_support::mock_server_unavailable() {
            return Ok(());
        }

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/settings/settings");
                then.status(200).json_body(json!([
                    { "id": "s1", "key": "ocr.language", "value": "eng", "category": "OCR" },
                    { "id": "s2", "key": "ui.theme", "value": "dark", "category": "ui" },
                    { "id": "s3", "key": "orphan", "value": null }
                ]));
            })
            .await;

        let client = AdminClient::new(ApiClient::new(&server.base_url())?);
        let all = client.settings(None).await?;
        assert_eq!(all.len(), 3);
        let ocr = client.settings(Some("ocr")).await?;
        assert_eq!(ocr.len(), 1);
        assert_eq!(ocr[0].key.as_deref(), Some("ocr.language"));
        Ok(())
    }

    #[tokio::test]
    async fn update_setting_puts_value() -> Result<()> {
        if crate::utils::test_support::mock_server_unavailable() {
            return Ok(());
        }

        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/api/settings/settings/s1")
                    .json_body(json!({ "value": "deu" }));
                then.status(200)
                    .json_body(json!({ "id": "s1", "value": "deu", "category": "ocr" }));
            })
            .await;

        let client = AdminClient::new(ApiClient::new(&server.base_url())?);
        let updated = client.update_setting("s1", json!("deu")).await?;
        mock.assert_async().await;
        assert_eq!(updated.value, json!("deu"));
        Ok(())
    }

    #[tokio::test]
    async fn cache_stats_and_clear() -> Result<()> {
        if crate::utils::test_support::mock_server_unavailable() {
            return Ok(());
        }

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/cache/stats");
                then.status(200)
                    .json_body(json!({ "entries": 12, "hits": 40, "misses": 3, "backend": "memory" }));
            })
            .await;
        let clear = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/cache/clear");
                then.status(200).json_body(json!({ "cleared": 12 }));
            })
            .await;

        let client = AdminClient::new(ApiClient::new(&server.base_url())?);
        let stats = client.cache_stats().await?;
        assert_eq!(stats.entries, Some(12));
        assert_eq!(stats.extra.get("backend"), Some(&json!("memory")));

        let cleared = client.clear_cache().await?;
        clear.assert_async().await;
        assert_eq!(cleared["cleared"], 12);
        Ok(())
    }
}
