//! Hugging Face sequence-classification models on CPU, via candle.
//!
//! Supports the two architectures the routing table uses: BERT (with pooler)
//! and DistilBERT (with pre-classifier). Weights, config and tokenizer are
//! fetched through the hf-hub cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{DType, Device, IndexOp, Module, Tensor, D};
use candle_nn::{Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::distilbert::{Config as DistilBertConfig, DistilBertModel};
use serde::Deserialize;
use tokenizers::{Tokenizer, TruncationParams};

use super::{ModelHandle, ModelLoader, ModelSpec, RawPrediction, SentimentModel};
use crate::error::{InferenceError, LoadError, Result};

const MAX_SEQUENCE_TOKENS: usize = 512;

#[derive(Debug, Deserialize)]
struct HeadConfig {
    #[serde(default)]
    model_type: Option<String>,
    #[serde(default)]
    id2label: BTreeMap<String, String>,
    #[serde(alias = "dim")]
    hidden_size: usize,
}

/// Files resolved from the hub cache for one model.
struct ModelFiles {
    config: PathBuf,
    weights: PathBuf,
    tokenizer_json: Option<PathBuf>,
    vocab: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct CandleLoader {
    revision: Option<String>,
}

impl CandleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    fn fetch(&self, model_id: &str) -> std::result::Result<ModelFiles, LoadError> {
        let not_found = |reason: String| LoadError::NotFound {
            model: model_id.to_string(),
            reason,
        };

        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| not_found(format!("failed to initialise hub client: {e}")))?;
        let repo = match &self.revision {
            Some(revision) => api.repo(hf_hub::Repo::with_revision(
                model_id.to_string(),
                hf_hub::RepoType::Model,
                revision.clone(),
            )),
            None => api.model(model_id.to_string()),
        };

        let config = repo
            .get("config.json")
            .map_err(|e| not_found(format!("config.json: {e}")))?;
        let weights = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))
            .map_err(|e| not_found(format!("no weights (safetensors or bin): {e}")))?;
        let tokenizer_json = repo.get("tokenizer.json").ok();
        let vocab = repo.get("vocab.txt").ok();
        if tokenizer_json.is_none() && vocab.is_none() {
            return Err(not_found("no tokenizer.json or vocab.txt".into()));
        }

        Ok(ModelFiles {
            config,
            weights,
            tokenizer_json,
            vocab,
        })
    }
}

impl ModelLoader for CandleLoader {
    fn load(&self, spec: &ModelSpec) -> std::result::Result<ModelHandle, LoadError> {
        let model_id = spec.model_id.as_str();
        let format_err = |reason: String| LoadError::Format {
            model: model_id.to_string(),
            reason,
        };
        let runtime_err = |reason: String| LoadError::Runtime {
            model: model_id.to_string(),
            reason,
        };

        tracing::info!(model = model_id, "downloading model from the hub");
        let files = self.fetch(model_id)?;

        let raw_config = std::fs::read_to_string(&files.config)
            .map_err(|e| format_err(format!("failed to read config: {e}")))?;
        let head: HeadConfig = serde_json::from_str(&raw_config)
            .map_err(|e| format_err(format!("failed to parse config: {e}")))?;
        let labels = ordered_labels(&head.id2label).map_err(format_err)?;

        let tokenizer = load_tokenizer(&files).map_err(format_err)?;
        let device = Device::Cpu;
        let vb = load_weights(&files.weights, &device).map_err(runtime_err)?;

        let encoder = match head.model_type.as_deref() {
            Some("distilbert") => {
                let config: DistilBertConfig = serde_json::from_str(&raw_config)
                    .map_err(|e| format_err(format!("invalid DistilBERT config: {e}")))?;
                let model = DistilBertModel::load(vb.pp("distilbert"), &config)
                    .map_err(|e| runtime_err(format!("failed to load DistilBERT: {e}")))?;
                let pre_classifier =
                    candle_nn::linear(head.hidden_size, head.hidden_size, vb.pp("pre_classifier"))
                        .map_err(|e| runtime_err(format!("missing pre_classifier: {e}")))?;
                Encoder::DistilBert {
                    model,
                    pre_classifier,
                }
            }
            Some("bert") | None => {
                let config: BertConfig = serde_json::from_str(&raw_config)
                    .map_err(|e| format_err(format!("invalid BERT config: {e}")))?;
                let model = BertModel::load(vb.pp("bert"), &config)
                    .map_err(|e| runtime_err(format!("failed to load BERT: {e}")))?;
                let pooler = candle_nn::linear(
                    head.hidden_size,
                    head.hidden_size,
                    vb.pp("bert").pp("pooler").pp("dense"),
                )
                .map_err(|e| runtime_err(format!("missing pooler: {e}")))?;
                Encoder::Bert { model, pooler }
            }
            Some(other) => {
                return Err(format_err(format!("unsupported architecture {other}")));
            }
        };

        let classifier = candle_nn::linear(head.hidden_size, labels.len(), vb.pp("classifier"))
            .map_err(|e| runtime_err(format!("missing classification head: {e}")))?;

        tracing::info!(
            model = model_id,
            labels = ?labels,
            "loaded sequence classifier"
        );

        Ok(Arc::new(CandleClassifier {
            spec: spec.clone(),
            tokenizer,
            encoder,
            classifier,
            labels,
            device,
        }))
    }

    fn backend(&self) -> &'static str {
        "candle"
    }
}

/// `{"0": "NEGATIVE", "1": "POSITIVE"}` -> `["NEGATIVE", "POSITIVE"]`
fn ordered_labels(id2label: &BTreeMap<String, String>) -> std::result::Result<Vec<String>, String> {
    if id2label.is_empty() {
        return Err("config has no id2label table".into());
    }
    let mut indexed = id2label
        .iter()
        .map(|(id, label)| {
            id.parse::<usize>()
                .map(|id| (id, label.clone()))
                .map_err(|_| format!("non-numeric label id {id:?}"))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    indexed.sort_by_key(|(id, _)| *id);
    Ok(indexed.into_iter().map(|(_, label)| label).collect())
}

fn load_weights(path: &Path, device: &Device) -> std::result::Result<VarBuilder<'static>, String> {
    let is_safetensors = path.extension().is_some_and(|ext| ext == "safetensors");
    if is_safetensors {
        // SAFETY: the hub cache file is not modified while mapped.
        unsafe {
            VarBuilder::from_mmaped_safetensors(&[path.to_path_buf()], DType::F32, device)
                .map_err(|e| format!("failed to map weights: {e}"))
        }
    } else {
        VarBuilder::from_pth(path, DType::F32, device)
            .map_err(|e| format!("failed to read weights: {e}"))
    }
}

fn load_tokenizer(files: &ModelFiles) -> std::result::Result<Tokenizer, String> {
    let mut tokenizer = match (&files.tokenizer_json, &files.vocab) {
        (Some(path), _) => Tokenizer::from_file(path)
            .map_err(|e| format!("failed to load tokenizer.json: {e}"))?,
        (None, Some(vocab)) => wordpiece_from_vocab(vocab)?,
        (None, None) => return Err("no tokenizer files".into()),
    };
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_SEQUENCE_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| format!("failed to configure truncation: {e}"))?;
    tokenizer.with_padding(None);
    Ok(tokenizer)
}

/// Older checkpoints ship only `vocab.txt`; rebuild the BERT uncased pipeline.
fn wordpiece_from_vocab(vocab: &Path) -> std::result::Result<Tokenizer, String> {
    use tokenizers::models::wordpiece::WordPiece;
    use tokenizers::normalizers::BertNormalizer;
    use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
    use tokenizers::processors::bert::BertProcessing;

    let wordpiece = WordPiece::from_file(&vocab.to_string_lossy())
        .unk_token("[UNK]".to_string())
        .build()
        .map_err(|e| format!("failed to build WordPiece model: {e}"))?;

    let mut tokenizer = Tokenizer::new(wordpiece);
    let cls = tokenizer
        .token_to_id("[CLS]")
        .ok_or("vocab.txt has no [CLS] token")?;
    let sep = tokenizer
        .token_to_id("[SEP]")
        .ok_or("vocab.txt has no [SEP] token")?;
    tokenizer.with_normalizer(Some(BertNormalizer::default()));
    tokenizer.with_pre_tokenizer(Some(BertPreTokenizer));
    tokenizer.with_post_processor(Some(BertProcessing::new(
        ("[SEP]".to_string(), sep),
        ("[CLS]".to_string(), cls),
    )));
    Ok(tokenizer)
}

enum Encoder {
    Bert {
        model: BertModel,
        pooler: Linear,
    },
    DistilBert {
        model: DistilBertModel,
        pre_classifier: Linear,
    },
}

struct CandleClassifier {
    spec: ModelSpec,
    tokenizer: Tokenizer,
    encoder: Encoder,
    classifier: Linear,
    labels: Vec<String>,
    device: Device,
}

fn forward_err(e: candle_core::Error) -> InferenceError {
    InferenceError::Forward(e.to_string())
}

impl CandleClassifier {
    fn logits(&self, text: &str) -> Result<Tensor> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| InferenceError::Tokenization(e.to_string()))?;

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(forward_err)?;

        let pooled = match &self.encoder {
            Encoder::Bert { model, pooler } => {
                let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)
                    .and_then(|t| t.unsqueeze(0))
                    .map_err(forward_err)?;
                let hidden = model
                    .forward(&input_ids, &token_type_ids, None)
                    .map_err(forward_err)?;
                let cls = hidden.i((.., 0, ..)).map_err(forward_err)?;
                pooler
                    .forward(&cls)
                    .and_then(|t| t.tanh())
                    .map_err(forward_err)?
            }
            Encoder::DistilBert {
                model,
                pre_classifier,
            } => {
                // candle masks positions where the mask is non-zero; a single
                // unpadded sequence masks nothing.
                let mask = Tensor::zeros((1, encoding.get_ids().len()), DType::U8, &self.device)
                    .map_err(forward_err)?;
                let hidden = model.forward(&input_ids, &mask).map_err(forward_err)?;
                let cls = hidden.i((.., 0, ..)).map_err(forward_err)?;
                pre_classifier
                    .forward(&cls)
                    .and_then(|t| t.relu())
                    .map_err(forward_err)?
            }
        };

        self.classifier.forward(&pooled).map_err(forward_err)
    }
}

impl SentimentModel for CandleClassifier {
    fn predict(&self, text: &str) -> Result<Vec<RawPrediction>> {
        let logits = self.logits(text)?;
        let probs: Vec<f32> = candle_nn::ops::softmax(&logits, D::Minus1)
            .and_then(|p| p.squeeze(0))
            .and_then(|p| p.to_vec1())
            .map_err(forward_err)?;

        let best = probs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(idx, prob)| (idx, *prob));

        Ok(best
            .map(|(idx, prob)| {
                let label = self
                    .labels
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| format!("LABEL_{idx}"));
                RawPrediction::new(label, prob)
            })
            .into_iter()
            .collect())
    }

    fn spec(&self) -> &ModelSpec {
        &self.spec
    }
}
