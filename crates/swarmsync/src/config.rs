use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use swarmsync_download::DownloadOptions;
use swarmsync_process::ExecutorOptions;

use crate::error::{Error, Result};

fn default_async_workers() -> usize { 8 }

fn default_concurrency() -> usize { 5 }

fn default_chunk_size() -> usize { 1024 * 1024 }

fn default_resend_limit() -> u32 { 3 }

fn default_log_level() -> String { "info".to_string() }

/// Client configuration, usually read from a TOML file.
///
/// Every section and key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub process:  ProcessConfig,
    pub download: DownloadConfig,
    pub upload:   UploadConfig,
    pub logging:  LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Upper bound on asynchronous components running at once.
    pub async_workers:    usize,
    /// Default bound for blocking waits on process trees.
    pub await_timeout_ms: Option<u64>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            async_workers:    default_async_workers(),
            await_timeout_ms: None,
        }
    }
}

impl ProcessConfig {
    pub fn await_timeout(&self) -> Option<Duration> { self.await_timeout_ms.map(Duration::from_millis) }

    pub fn executor_options(&self) -> ExecutorOptions { ExecutorOptions::new().workers(self.async_workers) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Chunks fetched at once across all downloads.
    pub concurrency:     usize,
    /// Parent of per-download staging directories. System temp if unset.
    pub temp_root:       Option<PathBuf>,
    pub join_timeout_ms: Option<u64>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency:     default_concurrency(),
            temp_root:       None,
            join_timeout_ms: None,
        }
    }
}

impl DownloadConfig {
    pub fn join_timeout(&self) -> Option<Duration> { self.join_timeout_ms.map(Duration::from_millis) }

    pub fn download_options(&self) -> DownloadOptions {
        let options = DownloadOptions::new().concurrency(self.concurrency);
        match &self.temp_root {
            Some(root) => options.temp_root(root),
            None => options,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Bytes per chunk.
    pub chunk_size:          usize,
    /// Extra attempts per peer when a notification asks to be resent.
    pub notify_resend_limit: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size:          default_chunk_size(),
            notify_resend_limit: default_resend_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self { Self { level: default_log_level() } }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> { Ok(toml::from_str(s)?) }

    pub fn to_toml_string(&self) -> Result<String> { Ok(toml::to_string_pretty(self)?) }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Writes the configuration atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        swarmsync_fs::atomic_write(path, self.to_toml_string()?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.process.async_workers, 8);
        assert_eq!(config.download.concurrency, 5);
        assert_eq!(config.upload.chunk_size, 1024 * 1024);
        assert_eq!(config.upload.notify_resend_limit, 3);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.process.await_timeout(), None);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [download]
            concurrency = 2
            join_timeout_ms = 1500

            [logging]
            level = "swarmsync=debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.download.concurrency, 2);
        assert_eq!(config.download.join_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(config.download.temp_root, None);
        assert_eq!(config.upload, UploadConfig::default());
        assert_eq!(config.logging.level, "swarmsync=debug");
    }

    #[test]
    fn bad_types_are_rejected() {
        let err = Config::from_toml_str("[upload]\nchunk_size = \"big\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn save_then_load() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("swarmsync.toml");
        let mut config = Config::default();
        config.download.temp_root = Some(temp.path().join("staging"));
        config.process.await_timeout_ms = Some(30_000);

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
