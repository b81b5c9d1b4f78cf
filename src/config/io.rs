use std::env::current_exe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use directories_next::ProjectDirs;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use serde_json;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{info, warn};
use std::fs::OpenOptions;
use std::str;

use crate::config::types::Config;
use crate::error::ConfigError;

// creates a path to sensortag-link.json in the same directory as the executable
// this could be useful for usb sticks
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            // /opt/sensortag-link => /opt/sensortag-link.json
            if !path.set_extension("json") {
                warn!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to sensortag-link.json in an os dependent standard directory, such as
// ~/.config/sensortag-link on linux.
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "sensortag", "sensortag-link").map(|dirs| {
        dirs.config_dir().join("sensortag-link.json")
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        if std::fs::metadata(&path).map(|attr| attr.is_file()).unwrap_or(false) {
            return Ok(path);
        }
    }

    get_local_config_path().ok_or(ConfigError::NoConfigPath)
}

/// Holds the exclusive lock on the config file so that only one instance of the service runs.
pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<'_, std::fs::File>, ConfigError> {
        self.rw_lock.try_write().map_err(|source| ConfigError::CanNotLock { source })
    }
}

struct ConfigIOInner {
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    /// Opens the config file at the default location, creating it (empty) if needed.
    pub fn new_sync() -> Result<Self, ConfigError> {
        let path = get_config_path()?;
        ConfigIO::open_sync(&path)
    }

    pub fn open_sync(path: &Path) -> Result<Self, ConfigError> {
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent() {
            std::fs::create_dir_all(directory)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        let inner = ConfigIOInner {
            file,
        };
        Ok(ConfigIO { inner: Arc::new(Mutex::new(inner)) })
    }

    fn inner(&self) -> MutexGuard<'_, ConfigIOInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn locker(&self) -> Result<ConfigIOLocker, ConfigError> {
        let inner = self.inner();

        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(inner.file.try_clone()?),
        })
    }

    // The File returned from here should never be closed!
    fn get_file(&self) -> Result<File, ConfigError> {
        let file = self.inner().file.try_clone()?; // std File
        Ok(File::from_std(file)) // tokio File
    }

    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = self.get_file()?;

        let mut content = vec![];
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        if content.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        info!("Saving config");

        let content = serde_json::to_string_pretty(config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sensortag-link-test-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("config.json")
    }

    #[tokio::test]
    async fn empty_file_reads_as_defaults() {
        let path = temp_config_path("empty");
        let io = ConfigIO::open_sync(&path).unwrap();

        assert_eq!(io.read().await.unwrap(), Config::default());
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn save_then_read() {
        let path = temp_config_path("save");
        let io = ConfigIO::open_sync(&path).unwrap();

        let mut config = Config::default();
        config.target_name = "CC2650 SensorTag".to_string();
        config.scan_period_ms = 5000;
        io.save(&config).await.unwrap();

        let reopened = ConfigIO::open_sync(&path).unwrap();
        assert_eq!(reopened.read().await.unwrap(), config);
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() {
        let path = temp_config_path("invalid");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let io = ConfigIO::open_sync(&path).unwrap();
        assert!(matches!(io.read().await, Err(ConfigError::JsonError { .. })));
    }
}
