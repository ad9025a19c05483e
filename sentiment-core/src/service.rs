//! Sentiment Service
//!
//! Facade tying the engine, the batch processor and an optional history sink
//! together. This is what the HTTP layer holds on to.

use std::sync::Arc;

use crate::batch::{BatchConfig, BatchProcessor};
use crate::config::EngineConfig;
use crate::engine::InferenceEngine;
use crate::error::LoadError;
use crate::normalizer::TextNormalizer;
use crate::registry::ModelRegistry;
use crate::types::{
    AnalysisRequest, AnalysisResult, BatchRequest, BatchStatistics, Language, Sentiment,
};

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Destination for successful analyses.
pub trait HistorySink: Send + Sync {
    /// Persists one record and returns its id.
    fn append(
        &self,
        text: &str,
        sentiment: Sentiment,
        confidence: f64,
        language: &Language,
    ) -> Result<u64, SinkError>;
}

#[derive(Clone)]
pub struct SentimentService {
    batch: BatchProcessor,
    sink: Option<Arc<dyn HistorySink>>,
    max_batch_size: usize,
}

impl std::fmt::Debug for SentimentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentService")
            .field("registry", self.registry())
            .field("history", &self.sink.is_some())
            .field("max_batch_size", &self.max_batch_size)
            .finish()
    }
}

impl SentimentService {
    pub fn new(registry: Arc<ModelRegistry>, config: &EngineConfig) -> Self {
        let engine = InferenceEngine::new(registry, TextNormalizer::new(config.max_chars));
        let batch = BatchProcessor::new(
            engine,
            BatchConfig {
                parallel: config.parallel_batches,
            },
        );
        Self {
            batch,
            sink: None,
            max_batch_size: config.max_batch_size,
        }
    }

    /// Builds the registry from the configured backend.
    pub fn from_config(config: &EngineConfig) -> Result<Self, LoadError> {
        let loader = config.backend.loader()?;
        let registry = Arc::new(ModelRegistry::with_keying(loader, config.cache_keying));
        Ok(Self::new(registry, config))
    }

    pub fn with_history(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        self.batch.engine().registry()
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn models_loaded(&self) -> Vec<String> {
        self.registry().loaded_keys()
    }

    pub fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        let result = self.batch.engine().analyze(&request.text, &request.language);
        if request.save_history {
            self.record(&result);
        }
        result
    }

    pub fn analyze_batch(&self, request: &BatchRequest) -> (Vec<AnalysisResult>, BatchStatistics) {
        let (results, statistics) = self.batch.analyze_many(&request.texts, &request.language);
        if request.save_history {
            for result in &results {
                self.record(result);
            }
        }
        (results, statistics)
    }

    fn record(&self, result: &AnalysisResult) {
        let Some(sink) = &self.sink else {
            return;
        };
        if !result.is_success() {
            return;
        }
        let (Some(sentiment), Some(confidence)) = (result.sentiment, result.confidence) else {
            return;
        };
        if let Err(err) = sink.append(&result.original_text, sentiment, confidence, &result.language) {
            tracing::error!(error = %err, "failed to save analysis to history");
        }
    }
}
