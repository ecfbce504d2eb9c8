//! Model byte sources
//!
//! A device keeps its model either as a file on a flash filesystem or as a
//! raw flash partition image. Both are [`ModelLoader`]s; the detector only
//! sees a location string and the bytes that come back.

use crate::error::{Result, WakeWordError};
use std::path::Path;

/// Largest model accepted from the filesystem (1 MiB)
pub const MAX_MODEL_SIZE: u64 = 1024 * 1024;

/// Source of serialized models
pub trait ModelLoader: Send + Sync {
    /// Read the whole model at `location`
    fn load(&self, location: &str) -> Result<Vec<u8>>;
}

/// Loads models from files, rejecting empty or oversized ones
#[derive(Debug, Clone)]
pub struct FsModelLoader {
    max_size: u64,
}

impl Default for FsModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FsModelLoader {
    pub fn new() -> Self {
        Self {
            max_size: MAX_MODEL_SIZE,
        }
    }

    pub fn with_max_size(max_size: u64) -> Self {
        Self { max_size }
    }
}

impl ModelLoader for FsModelLoader {
    fn load(&self, location: &str) -> Result<Vec<u8>> {
        let path = Path::new(location);
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WakeWordError::ModelNotFound(location.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let size = metadata.len();
        if size == 0 || size > self.max_size {
            tracing::error!(path = location, size, max = self.max_size, "Invalid model size");
            return Err(WakeWordError::InvalidModelSize {
                size,
                max: self.max_size,
            });
        }

        let bytes = std::fs::read(path)?;
        tracing::info!(path = location, size = bytes.len(), "Model loaded from file");
        Ok(bytes)
    }
}

/// A model image held in memory under a name
///
/// Stands in for a raw flash partition: the image is served for its name
/// only, every other location is not found.
#[derive(Debug, Clone)]
pub struct MemoryModelLoader {
    name: String,
    image: Vec<u8>,
}

impl MemoryModelLoader {
    pub fn new(name: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }
}

impl ModelLoader for MemoryModelLoader {
    fn load(&self, location: &str) -> Result<Vec<u8>> {
        if location != self.name {
            return Err(WakeWordError::ModelNotFound(location.to_string()));
        }
        if self.image.is_empty() {
            return Err(WakeWordError::InvalidModelSize {
                size: 0,
                max: MAX_MODEL_SIZE,
            });
        }
        tracing::info!(partition = %self.name, size = self.image.len(), "Model loaded from image");
        Ok(self.image.clone())
    }
}

/// Tries each loader in turn for the same location
///
/// Returns the first success, or the last loader's error.
#[derive(Default)]
pub struct ChainLoader {
    loaders: Vec<Box<dyn ModelLoader>>,
}

impl ChainLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, loader: impl ModelLoader + 'static) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl ModelLoader for ChainLoader {
    fn load(&self, location: &str) -> Result<Vec<u8>> {
        let mut last = WakeWordError::ModelNotFound(location.to_string());
        for loader in &self.loaders {
            match loader.load(location) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}

/// Load `primary`, falling back to `fallback` if that fails
///
/// The primary error is logged, the fallback error (if any) is returned.
pub fn load_with_fallback(
    loader: &dyn ModelLoader,
    primary: &str,
    fallback: Option<&str>,
) -> Result<Vec<u8>> {
    match loader.load(primary) {
        Ok(bytes) => Ok(bytes),
        Err(e) => match fallback {
            Some(fallback) => {
                tracing::warn!(
                    primary,
                    fallback,
                    error = %e,
                    "Primary model unavailable, trying fallback"
                );
                loader.load(fallback)
            }
            None => Err(e),
        },
    }
}
