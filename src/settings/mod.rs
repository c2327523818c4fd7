mod editor;

use std::io;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use futures_util::future::LocalBoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use editor::{edit_settings, EditOutcome, TerminalPrompter};

pub const DEFAULT_SILENCE_TIMEOUT_SEC: u32 = 8;
pub const DEFAULT_ASR_LANGUAGE: &str = "en";

fn default_silence_timeout() -> NonZeroU32 {
    NonZeroU32::new(DEFAULT_SILENCE_TIMEOUT_SEC).unwrap_or(NonZeroU32::MIN)
}

fn default_asr_language() -> String {
    DEFAULT_ASR_LANGUAGE.into()
}

/// Settings shared with the ASR service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Seconds of silence before the ASR service stops listening.
    #[serde(default = "default_silence_timeout")]
    pub silence_timeout_sec: NonZeroU32,
    /// ISO-639-1 code, e.g. "en".
    #[serde(default = "default_asr_language")]
    pub asr_language: String,
    /// Keys owned by other services, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            silence_timeout_sec: default_silence_timeout(),
            asr_language: default_asr_language(),
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not fetch settings: {0}")]
    Fetch(#[source] StoreError),
    #[error("could not save settings: {0}")]
    Persist(#[source] StoreError),
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },
    #[error("prompt failed: {0}")]
    Prompt(#[from] io::Error),
}

/// External home of the settings. `persist` replaces the stored value wholesale.
pub trait SettingsStore {
    fn fetch(&self) -> LocalBoxFuture<'_, Result<SettingsConfig, StoreError>>;
    fn persist<'a>(
        &'a self,
        config: &'a SettingsConfig,
    ) -> LocalBoxFuture<'a, Result<(), StoreError>>;
}

/// JSON file under the user config directory.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// ~/.config/gains/settings.json
    pub fn default_path() -> PathBuf {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("gains");
        p.push("settings.json");
        p
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }

    /// Write `config` beside the target. The target is untouched until `persist` renames.
    async fn stage(&self, config: &SettingsConfig) -> Result<PathBuf, StoreError> {
        let data = serde_json::to_string_pretty(config).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_err(e))?;
        }
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| self.io_err(e))?;
        Ok(tmp)
    }

    fn io_err(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SettingsStore for JsonFileStore {
    fn fetch(&self) -> LocalBoxFuture<'_, Result<SettingsConfig, StoreError>> {
        async move {
            let data = match tokio::fs::read_to_string(&self.path).await {
                Ok(data) => data,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::info!(
                        "No settings at {}, starting from defaults",
                        self.path.display()
                    );
                    return Ok(SettingsConfig::default());
                }
                Err(e) => return Err(self.io_err(e)),
            };
            serde_json::from_str(&data).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })
        }
        .boxed_local()
    }

    fn persist<'a>(
        &'a self,
        config: &'a SettingsConfig,
    ) -> LocalBoxFuture<'a, Result<(), StoreError>> {
        async move {
            // Readers never see half a file.
            let tmp = self.stage(config).await?;
            tokio::fs::rename(&tmp, &self.path)
                .await
                .map_err(|e| self.io_err(e))?;
            log::info!("Settings saved to {}", self.path.display());
            Ok(())
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_fetches_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));
        let cfg = store.fetch().await.unwrap();
        assert_eq!(cfg.silence_timeout_sec.get(), 8);
        assert_eq!(cfg.asr_language, "en");
    }

    #[tokio::test]
    async fn missing_fields_default_and_extra_keys_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"asr_language":"fr","tts_voice":"alba"}"#).unwrap();

        let store = JsonFileStore::new(&path);
        let mut cfg = store.fetch().await.unwrap();
        assert_eq!(cfg.silence_timeout_sec.get(), 8);
        assert_eq!(cfg.asr_language, "fr");

        cfg.silence_timeout_sec = NonZeroU32::new(15).unwrap();
        store.persist(&cfg).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["silence_timeout_sec"], 15);
        assert_eq!(raw["asr_language"], "fr");
        assert_eq!(raw["tts_voice"], "alba");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn zero_timeout_on_disk_is_a_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"silence_timeout_sec":0}"#).unwrap();
        let err = JsonFileStore::new(&path).fetch().await.unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[tokio::test]
    async fn write_interrupted_before_rename_keeps_prior_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = JsonFileStore::new(&path);
        let prior = SettingsConfig {
            silence_timeout_sec: NonZeroU32::new(12).unwrap(),
            ..SettingsConfig::default()
        };
        store.persist(&prior).await.unwrap();

        let next = SettingsConfig {
            asr_language: "de".into(),
            ..prior.clone()
        };
        let tmp = store.stage(&next).await.unwrap();
        assert!(tmp.exists());

        assert_eq!(store.fetch().await.unwrap(), prior);

        // A later save replaces the leftover temp file.
        store.persist(&next).await.unwrap();
        assert_eq!(store.fetch().await.unwrap(), next);
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn persist_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("gains").join("settings.json");
        let store = JsonFileStore::new(&path);
        store.persist(&SettingsConfig::default()).await.unwrap();
        assert_eq!(store.fetch().await.unwrap(), SettingsConfig::default());
    }
}
