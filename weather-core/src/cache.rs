use std::{fmt::Debug, fs, io, path::PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;

use crate::error::WeatherError;

/// A single slot of opaque bytes: the serialized last selection.
pub trait CacheStore: Send + Sync + Debug {
    fn store(&self, data: &[u8]) -> Result<()>;

    /// Fails with [`WeatherError::CacheUnavailable`] when nothing is cached.
    fn retrieve(&self) -> Result<Vec<u8>, WeatherError>;

    fn clear(&self) -> Result<()>;
}

/// Cache slot backed by one file, usually under the platform cache directory.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    path: PathBuf,
}

impl FileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CacheStore for FileCacheStore {
    fn store(&self, data: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }

        fs::write(&self.path, data)
            .with_context(|| format!("Failed to write cache file: {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), bytes = data.len(), "cached selection");
        Ok(())
    }

    fn retrieve(&self) -> Result<Vec<u8>, WeatherError> {
        fs::read(&self.path).map_err(|err| {
            let reason = match err.kind() {
                io::ErrorKind::NotFound => "nothing cached yet".to_string(),
                _ => format!("{}: {err}", self.path.display()),
            };
            WeatherError::CacheUnavailable(reason)
        })
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to remove cache file: {}", self.path.display())),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    slot: Mutex<Option<Vec<u8>>>,
}

impl MemoryCacheStore {
    pub fn with_data(data: impl Into<Vec<u8>>) -> Self {
        Self { slot: Mutex::new(Some(data.into())) }
    }

    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.slot.lock().clone()
    }
}

impl CacheStore for MemoryCacheStore {
    fn store(&self, data: &[u8]) -> Result<()> {
        *self.slot.lock() = Some(data.to_vec());
        Ok(())
    }

    fn retrieve(&self) -> Result<Vec<u8>, WeatherError> {
        self.slot
            .lock()
            .clone()
            .ok_or_else(|| WeatherError::CacheUnavailable("nothing cached yet".to_string()))
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock() = None;
        Ok(())
    }
}
