use std::sync::Arc;

use serde_json::Value;

use crate::Result;
use crate::admin::AdminClient;
use crate::api::ApiClient;
use crate::batch::HttpBatchApi;
use crate::cache::{SharedCache, SweeperGuard, TtlCache, shared, spawn_sweeper};
use crate::config::{ClientConfig, Env};
use crate::controller::BatchController;
use crate::expansion::{Expansion, expand_selection};
use crate::ocr::OcrClient;
use crate::sharepoint::SharePointClient;
use crate::types::SelectionItem;

/// Everything a front end needs, wired from one [`ClientConfig`].
///
/// Owns the listing cache and its sweeper; both go away with the client.
pub struct Client {
    pub sharepoint: SharePointClient,
    pub ocr: OcrClient,
    pub admin: AdminClient,
    pub batches: BatchController,
    cache: SharedCache<Value>,
    _sweeper: SweeperGuard,
}

impl Client {
    /// Must be called inside a Tokio runtime: the cache sweeper is spawned here.
    pub fn from_config(config: &ClientConfig, env: &Env) -> Result<Self> {
        let api = ApiClient::from_config(config, env)?;
        let cache = shared(TtlCache::new(
            config.cache.namespace.clone(),
            config.cache.default_ttl(),
        ));
        let sweeper = spawn_sweeper(cache.clone(), config.cache.sweep_interval());

        Ok(Self {
            sharepoint: SharePointClient::new(api.clone()).with_cache(cache.clone()),
            ocr: OcrClient::new(api.clone()).with_cache(cache.clone(), config.cache.default_ttl()),
            admin: AdminClient::new(api.clone()),
            batches: BatchController::new(Arc::new(HttpBatchApi::new(api)), config.poll),
            cache,
            _sweeper: sweeper,
        })
    }

    pub fn cache(&self) -> &SharedCache<Value> {
        &self.cache
    }

    pub async fn expand(&self, items: &[SelectionItem]) -> Expansion {
        expand_selection(&self.sharepoint, items).await
    }
}
