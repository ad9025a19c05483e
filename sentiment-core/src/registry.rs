//! Model Registry
//!
//! Lazily loads one model per cache key and keeps it for the lifetime of the
//! registry. Concurrent first use of a key runs the loader once; everybody
//! else waits on the same cell.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{panic_message, LoadError};
use crate::model::{ModelHandle, ModelLoader, ModelSpec};
use crate::types::Language;

/// How cached handles are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKeying {
    /// One handle per requested language tag, even when tags share a model.
    #[default]
    LanguageTag,
    /// Tags that resolve to the same model id share one handle.
    ModelId,
}

impl std::str::FromStr for CacheKeying {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "language-tag" | "language" | "tag" => Ok(CacheKeying::LanguageTag),
            "model-id" | "model" => Ok(CacheKeying::ModelId),
            other => Err(format!(
                "unknown cache keying {other:?} (expected language-tag or model-id)"
            )),
        }
    }
}

type Slot = Arc<OnceCell<ModelHandle>>;

pub struct ModelRegistry {
    loader: Arc<dyn ModelLoader>,
    keying: CacheKeying,
    slots: RwLock<HashMap<String, Slot>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("backend", &self.loader.backend())
            .field("keying", &self.keying)
            .field("loaded", &self.loaded_keys())
            .finish()
    }
}

impl ModelRegistry {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self::with_keying(loader, CacheKeying::default())
    }

    pub fn with_keying(loader: Arc<dyn ModelLoader>, keying: CacheKeying) -> Self {
        Self {
            loader,
            keying,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn keying(&self) -> CacheKeying {
        self.keying
    }

    pub fn backend(&self) -> &'static str {
        self.loader.backend()
    }

    /// Model selection for a tag. Unknown tags resolve to the multilingual model.
    pub fn resolve(&self, language: &Language) -> ModelSpec {
        ModelSpec::for_language(language)
    }

    /// Returns the cached handle for `language`, loading it on first use.
    ///
    /// A failed load leaves the slot empty, so the next call retries.
    pub fn get_or_load(&self, language: &Language) -> Result<ModelHandle, LoadError> {
        let spec = self.resolve(language);
        let key = self.cache_key(language, &spec);
        let slot = self.slot(&key);

        slot.get_or_try_init(|| {
            tracing::info!(
                key = %key,
                model = %spec.model_id,
                backend = self.loader.backend(),
                "loading sentiment model"
            );
            // A panicking loader leaves the slot empty, like any other failure.
            let loaded = catch_unwind(AssertUnwindSafe(|| self.loader.load(&spec)))
                .unwrap_or_else(|payload| {
                    Err(LoadError::Runtime {
                        model: spec.model_id.clone(),
                        reason: format!("loader panicked: {}", panic_message(payload.as_ref())),
                    })
                });
            match loaded {
                Ok(handle) => {
                    metrics::counter!("sentiment_model_loads_total", "outcome" => "ok")
                        .increment(1);
                    Ok(handle)
                }
                Err(err) => {
                    metrics::counter!("sentiment_model_loads_total", "outcome" => "error")
                        .increment(1);
                    tracing::error!(key = %key, error = %err, "model load failed");
                    Err(err)
                }
            }
        })
        .cloned()
    }

    /// Keys whose model has finished loading, sorted.
    pub fn loaded_keys(&self) -> Vec<String> {
        let slots = match self.slots.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut keys: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Loads every listed language up front. Stops at the first failure.
    pub fn preload(&self, languages: &[Language]) -> Result<(), LoadError> {
        for language in languages {
            self.get_or_load(language)?;
        }
        Ok(())
    }

    fn cache_key(&self, language: &Language, spec: &ModelSpec) -> String {
        match self.keying {
            CacheKeying::LanguageTag => language.as_str().to_string(),
            CacheKeying::ModelId => spec.model_id.clone(),
        }
    }

    fn slot(&self, key: &str) -> Slot {
        {
            let slots = match self.slots.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(slot) = slots.get(key) {
                return Arc::clone(slot);
            }
        }

        let mut slots = match self.slots.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(slots.entry(key.to_string()).or_default())
    }
}
