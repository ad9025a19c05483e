use serde::{Deserialize, Serialize};

use crate::model::Backend;
use crate::normalizer::DEFAULT_MAX_CHARS;
use crate::registry::CacheKeying;

pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Tunables for the inference pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: Backend,
    pub max_chars: usize,
    pub cache_keying: CacheKeying,
    pub parallel_batches: bool,
    /// Largest batch accepted at the boundary.
    pub max_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            max_chars: DEFAULT_MAX_CHARS,
            cache_keying: CacheKeying::default(),
            parallel_batches: false,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}
