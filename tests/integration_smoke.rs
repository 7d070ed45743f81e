#![cfg(feature = "integration")]

use ocr_batch_client::{Client, ClientConfig, Env, Result};

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn live_client() -> Option<Result<Client>> {
    let base_url = env_nonempty("OCR_BATCH_BASE_URL")?;
    let config = ClientConfig {
        base_url,
        ..ClientConfig::default()
    };
    Some(Client::from_config(&config, &Env::default()))
}

#[tokio::test]
async fn libraries_smoke() -> Result<()> {
    let Some(client) = live_client() else {
        return Ok(());
    };
    let client = client?;

    let libraries = client.sharepoint.libraries().await?;
    for library in &libraries {
        assert!(!library.id.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn batch_list_and_cache_stats_smoke() -> Result<()> {
    let Some(client) = live_client() else {
        return Ok(());
    };
    let client = client?;

    let jobs = client.batches.list().await?;
    for job in &jobs {
        assert!(!job.batch_id.is_empty());
    }
    client.admin.cache_stats().await?;
    Ok(())
}
