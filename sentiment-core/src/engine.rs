//! Inference Engine
//!
//! One text in, one [`AnalysisResult`] out. Every failure mode is folded into
//! the result so callers never see an error.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{panic_message, InferenceError, Result};
use crate::labels::LabelNormalizer;
use crate::model::ModelHandle;
use crate::normalizer::TextNormalizer;
use crate::registry::ModelRegistry;
use crate::types::{AnalysisResult, Language, Sentiment};

pub const EMPTY_TEXT_ERROR: &str = "Empty text after preprocessing";
pub const MODEL_LOAD_ERROR: &str = "Model loading failed";

#[derive(Debug, Clone)]
pub struct InferenceEngine {
    registry: Arc<ModelRegistry>,
    normalizer: TextNormalizer,
    labels: LabelNormalizer,
}

impl InferenceEngine {
    pub fn new(registry: Arc<ModelRegistry>, normalizer: TextNormalizer) -> Self {
        Self {
            registry,
            normalizer,
            labels: LabelNormalizer,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn analyze(&self, text: &str, language: &Language) -> AnalysisResult {
        let started = Instant::now();
        let normalized = self.normalizer.normalize(text);

        let mut result = AnalysisResult {
            original_text: text.to_string(),
            normalized_text: normalized,
            sentiment: None,
            confidence: None,
            language: language.clone(),
            processing_time_seconds: 0.0,
            error: None,
        };

        if result.normalized_text.is_empty() {
            result.sentiment = Some(Sentiment::Neutral);
            result.confidence = Some(0.0);
            result.error = Some(EMPTY_TEXT_ERROR.to_string());
            return finish(result, started);
        }

        let model = match self.registry.get_or_load(language) {
            Ok(model) => model,
            Err(err) => {
                tracing::warn!(language = %language, error = %err, "no model available");
                result.error = Some(MODEL_LOAD_ERROR.to_string());
                return finish(result, started);
            }
        };

        match invoke(&model, &result.normalized_text) {
            Ok((label, score)) => {
                let (sentiment, confidence) = self.labels.normalize(&label, score);
                result.sentiment = Some(sentiment);
                result.confidence = Some(confidence);
            }
            Err(err) => {
                tracing::warn!(
                    language = %language,
                    model = %model.spec().model_id,
                    error = %err,
                    "inference failed"
                );
                result.error = Some(err.to_string());
            }
        }

        finish(result, started)
    }
}

/// Calls the model, insisting on exactly one prediction and containing panics.
fn invoke(model: &ModelHandle, text: &str) -> Result<(String, f32)> {
    let outcome = catch_unwind(AssertUnwindSafe(|| model.predict(text)))
        .map_err(|payload| InferenceError::Panicked(panic_message(payload.as_ref())))?;

    let mut predictions = outcome?;
    if predictions.len() != 1 {
        return Err(InferenceError::PredictionCount(predictions.len()));
    }
    let prediction = predictions.remove(0);
    Ok((prediction.label, prediction.score))
}

fn finish(mut result: AnalysisResult, started: Instant) -> AnalysisResult {
    let elapsed = started.elapsed().as_secs_f64();
    result.processing_time_seconds = (elapsed * 1_000.0).round() / 1_000.0;

    let outcome = if result.is_success() { "ok" } else { "error" };
    metrics::counter!("sentiment_analyses_total", "outcome" => outcome).increment(1);
    if !result.is_success() {
        metrics::counter!("sentiment_analysis_failures_total").increment(1);
    }
    metrics::histogram!("sentiment_inference_seconds").record(elapsed);

    result
}
