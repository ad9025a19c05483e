//! Sentiment inference pipeline.
//!
//! Text goes through [`TextNormalizer`], is routed by [`ModelRegistry`] to a
//! classification model, and the raw label is mapped onto [`Sentiment`] by
//! [`LabelNormalizer`]. [`SentimentService`] is the entry point used by the
//! HTTP layer.

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod labels;
pub mod model;
pub mod normalizer;
pub mod registry;
pub mod service;
pub mod types;

pub use batch::{BatchConfig, BatchProcessor};
pub use config::EngineConfig;
pub use engine::InferenceEngine;
pub use error::{InferenceError, LoadError};
pub use labels::LabelNormalizer;
pub use model::{Backend, ModelHandle, ModelLoader, ModelSpec, OutputSchema, SentimentModel};
pub use normalizer::TextNormalizer;
pub use registry::{CacheKeying, ModelRegistry};
pub use service::{HistorySink, SentimentService, SinkError};
pub use types::{
    AnalysisRequest, AnalysisResult, BatchRequest, BatchStatistics, Language, Sentiment,
};
