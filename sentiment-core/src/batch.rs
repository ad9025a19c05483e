use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::InferenceEngine;
use crate::types::{AnalysisResult, BatchStatistics, Language};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Fan items out over the rayon pool. Output order is preserved either way.
    pub parallel: bool,
}

/// Runs the engine over a list of texts, isolating per-item failures.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    engine: InferenceEngine,
    config: BatchConfig,
}

impl BatchProcessor {
    pub fn new(engine: InferenceEngine, config: BatchConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn analyze_many(
        &self,
        texts: &[String],
        language: &Language,
    ) -> (Vec<AnalysisResult>, BatchStatistics) {
        let results: Vec<AnalysisResult> = if self.config.parallel {
            texts
                .par_iter()
                .map(|text| self.engine.analyze(text, language))
                .collect()
        } else {
            texts
                .iter()
                .map(|text| self.engine.analyze(text, language))
                .collect()
        };

        let statistics = BatchStatistics::from_results(&results);
        tracing::debug!(
            total = statistics.total,
            successful = statistics.successful,
            failed = statistics.failed,
            "batch complete"
        );
        (results, statistics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MODEL_LOAD_ERROR;
    use crate::error::LoadError;
    use crate::model::{LexiconLoader, ModelHandle, ModelLoader, ModelSpec};
    use crate::normalizer::TextNormalizer;
    use crate::registry::ModelRegistry;
    use crate::types::Sentiment;
    use std::sync::Arc;

    fn processor(parallel: bool) -> BatchProcessor {
        let registry = Arc::new(ModelRegistry::new(Arc::new(LexiconLoader)));
        let engine = InferenceEngine::new(registry, TextNormalizer::default());
        BatchProcessor::new(engine, BatchConfig { parallel })
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mixed_batch_isolates_the_empty_item() {
        for parallel in [false, true] {
            let (results, stats) = processor(parallel)
                .analyze_many(&texts(&["Great!", "Terrible.", ""]), &Language::En);

            assert_eq!(results.len(), 3);
            assert_eq!(results[0].sentiment, Some(Sentiment::Positive));
            assert_eq!(results[1].sentiment, Some(Sentiment::Negative));
            assert!(!results[2].is_success());

            assert_eq!(stats.total, 3);
            assert_eq!(stats.successful, 2);
            assert_eq!(stats.failed, 1);
            let distribution = stats.sentiment_distribution.unwrap();
            assert_eq!(distribution[&Sentiment::Positive], 1);
            assert_eq!(distribution[&Sentiment::Negative], 1);
            assert_eq!(distribution[&Sentiment::Neutral], 0);
        }
    }

    #[test]
    fn results_keep_input_order_and_duplicates() {
        let input = texts(&["good", "bad", "good", "meh", "bad"]);
        let (results, stats) = processor(true).analyze_many(&input, &Language::En);

        let echoed: Vec<&str> = results.iter().map(|r| r.original_text.as_str()).collect();
        assert_eq!(echoed, vec!["good", "bad", "good", "meh", "bad"]);
        assert_eq!(stats.successful + stats.failed, stats.total);
        let counted: usize = stats.sentiment_distribution.unwrap().values().sum();
        assert_eq!(counted, stats.successful);
    }

    #[test]
    fn empty_batch_has_no_distribution() {
        let (results, stats) = processor(false).analyze_many(&[], &Language::Es);
        assert!(results.is_empty());
        assert_eq!(stats.total, 0);
        assert!(stats.sentiment_distribution.is_none());
    }

    struct PanickingLoader;

    impl ModelLoader for PanickingLoader {
        fn load(&self, _spec: &ModelSpec) -> Result<ModelHandle, LoadError> {
            panic!("tokenizer file truncated");
        }

        fn backend(&self) -> &'static str {
            "panicking"
        }
    }

    #[test]
    fn loader_panic_fails_items_without_aborting_the_batch() {
        for parallel in [false, true] {
            let registry = Arc::new(ModelRegistry::new(Arc::new(PanickingLoader)));
            let engine = InferenceEngine::new(registry, TextNormalizer::default());
            let (results, stats) = BatchProcessor::new(engine, BatchConfig { parallel })
                .analyze_many(&texts(&["good", "bad"]), &Language::En);

            assert_eq!(results.len(), 2);
            for result in &results {
                assert_eq!(result.error.as_deref(), Some(MODEL_LOAD_ERROR));
            }
            assert_eq!(stats.failed, 2);
        }
    }
}
