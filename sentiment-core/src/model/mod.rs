//! Model Backends
//!
//! A backend turns a [`ModelSpec`] into a loaded [`SentimentModel`]. The
//! registry only ever talks to the [`ModelLoader`] trait.

mod lexicon;

#[cfg(feature = "candle")]
mod candle;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};
use crate::types::Language;

pub use lexicon::{LexiconLoader, LexiconModel};

#[cfg(feature = "candle")]
pub use self::candle::CandleLoader;

/// English binary classifier (POSITIVE / NEGATIVE).
pub const ENGLISH_MODEL_ID: &str = "distilbert-base-uncased-finetuned-sst-2-english";
/// Multilingual 1-to-5 star rating classifier.
pub const MULTILINGUAL_MODEL_ID: &str = "nlptown/bert-base-multilingual-uncased-sentiment";

/// Shape of the labels a model emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputSchema {
    /// `POSITIVE` / `NEGATIVE`
    Binary,
    /// `"1 star"` .. `"5 stars"`
    StarRating,
}

/// Identifies a backing model and the label schema it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSpec {
    pub model_id: String,
    pub schema: OutputSchema,
}

impl ModelSpec {
    pub fn english() -> Self {
        Self {
            model_id: ENGLISH_MODEL_ID.to_string(),
            schema: OutputSchema::Binary,
        }
    }

    pub fn multilingual() -> Self {
        Self {
            model_id: MULTILINGUAL_MODEL_ID.to_string(),
            schema: OutputSchema::StarRating,
        }
    }

    /// `en` gets the English model; every other tag, known or not, falls back
    /// to the multilingual one.
    pub fn for_language(language: &Language) -> Self {
        match language {
            Language::En => Self::english(),
            _ => Self::multilingual(),
        }
    }
}

/// One raw label/score pair as emitted by a model.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    pub label: String,
    pub score: f32,
}

impl RawPrediction {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// A loaded, ready-to-invoke classifier. Shared read-only across threads.
pub trait SentimentModel: Send + Sync {
    /// Classify already-normalized text. Well-behaved models return exactly
    /// one prediction: the top label and its probability.
    fn predict(&self, text: &str) -> Result<Vec<RawPrediction>>;

    fn spec(&self) -> &ModelSpec;
}

/// Shared handle to a loaded model.
pub type ModelHandle = Arc<dyn SentimentModel>;

/// Creates model instances. Called at most once per cache key at a time.
pub trait ModelLoader: Send + Sync {
    fn load(&self, spec: &ModelSpec) -> std::result::Result<ModelHandle, LoadError>;

    /// Backend name used in logs and metrics.
    fn backend(&self) -> &'static str;
}

/// Which backend the service should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Lexicon,
    Candle,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lexicon" => Ok(Backend::Lexicon),
            "candle" => Ok(Backend::Candle),
            other => Err(format!("unknown backend {other:?} (expected lexicon or candle)")),
        }
    }
}

impl Backend {
    pub fn loader(self) -> std::result::Result<Arc<dyn ModelLoader>, LoadError> {
        match self {
            Backend::Lexicon => Ok(Arc::new(LexiconLoader::default())),
            #[cfg(feature = "candle")]
            Backend::Candle => Ok(Arc::new(CandleLoader::new())),
            #[cfg(not(feature = "candle"))]
            Backend::Candle => Err(LoadError::BackendUnavailable(
                "candle (rebuild with the `candle` feature)".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_routing_table() {
        assert_eq!(ModelSpec::for_language(&Language::En).model_id, ENGLISH_MODEL_ID);
        assert_eq!(ModelSpec::for_language(&Language::En).schema, OutputSchema::Binary);
        for tag in ["es", "fr", "de", "multilingual", "pt", "klingon"] {
            let spec = ModelSpec::for_language(&Language::from(tag));
            assert_eq!(spec.model_id, MULTILINGUAL_MODEL_ID, "{tag}");
            assert_eq!(spec.schema, OutputSchema::StarRating);
        }
    }

    #[test]
    fn backend_parses_from_config_strings() {
        assert_eq!("Lexicon".parse::<Backend>().unwrap(), Backend::Lexicon);
        assert_eq!("candle".parse::<Backend>().unwrap(), Backend::Candle);
        assert!("onnx".parse::<Backend>().is_err());
    }
}
