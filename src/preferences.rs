use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

/// Small per-user state kept between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub theme: Theme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_library_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_folder_id: Option<String>,
}

impl Preferences {
    /// Missing files load as defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        match tokio::fs::read_to_string(path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes to a sibling temp file and renames it over `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, payload).await?;
        if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }

    pub fn remember_location(&mut self, library_id: &str, folder_id: Option<&str>) {
        self.last_library_id = Some(library_id.to_string());
        self.last_folder_id = folder_id.map(str::to_string);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let prefs = Preferences::load(dir.path().join("prefs.json")).await?;
        assert_eq!(prefs, Preferences::default());
        Ok(())
    }

    #[tokio::test]
    async fn save_then_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("prefs.json");

        let mut prefs = Preferences {
            theme: Theme::Dark,
            ..Preferences::default()
        };
        prefs.remember_location("lib-1", Some("folder-2"));
        prefs.save(&path).await?;

        assert!(!path.with_extension("tmp").exists());
        let loaded = Preferences::load(&path).await?;
        assert_eq!(loaded, prefs);
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("prefs.json");
        tokio::fs::write(&path, "{not json").await?;
        assert!(matches!(
            Preferences::load(&path).await,
            Err(crate::Error::Json(_))
        ));
        Ok(())
    }
}
