//! Lexicon-based classifier used when no neural backend is configured.
//!
//! Emits the same label schema as the model it stands in for, so the rest
//! of the pipeline cannot tell the difference.

use std::sync::Arc;

use aho_corasick::{AhoCorasick, MatchKind};

use super::{ModelHandle, ModelLoader, ModelSpec, OutputSchema, RawPrediction, SentimentModel};
use crate::error::{LoadError, Result};

const POSITIVE_TERMS: &[&str] = &[
    // en
    "good", "great", "excellent", "love", "loved", "lovely", "amazing", "wonderful", "happy",
    "fantastic", "awesome", "best", "nice", "perfect", "recommend", "recommended", "enjoy",
    "enjoyed", "glad", "beautiful", "brilliant", "superb", "delighted", "pleased",
    // emoji descriptions produced by the normalizer
    "smiling", "grinning", "heart", "thumbs_up", "party_popper", "star_struck", "clapping",
    // es / fr / de
    "encanta", "bueno", "excelente", "genial", "feliz", "adore", "génial", "magnifique",
    "heureux", "liebe", "gut", "toll", "ausgezeichnet", "wunderbar",
];

const NEGATIVE_TERMS: &[&str] = &[
    // en
    "bad", "terrible", "awful", "hate", "hated", "horrible", "worst", "sad", "angry",
    "disappointed", "disappointing", "poor", "broken", "useless", "waste", "annoying",
    "never again",
    // emoji descriptions produced by the normalizer
    "crying", "thumbs_down", "pouting", "angry_face", "broken_heart",
    // es / fr / de
    "malo", "odio", "peor", "mauvais", "déteste", "nul", "schlecht", "hasse", "schrecklich",
    "furchtbar",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Positive,
    Negative,
}

pub struct LexiconModel {
    spec: ModelSpec,
    matcher: AhoCorasick,
    polarity: Vec<Polarity>,
}

impl LexiconModel {
    pub fn new(spec: ModelSpec) -> std::result::Result<Self, LoadError> {
        let mut terms = Vec::with_capacity(POSITIVE_TERMS.len() + NEGATIVE_TERMS.len());
        let mut polarity = Vec::with_capacity(terms.capacity());
        for term in POSITIVE_TERMS {
            terms.push(*term);
            polarity.push(Polarity::Positive);
        }
        for term in NEGATIVE_TERMS {
            terms.push(*term);
            polarity.push(Polarity::Negative);
        }

        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&terms)
            .map_err(|e| LoadError::Runtime {
                model: spec.model_id.clone(),
                reason: format!("failed to build lexicon matcher: {e}"),
            })?;

        Ok(Self {
            spec,
            matcher,
            polarity,
        })
    }

    /// Counts whole-word lexicon hits as `(positive, negative)`.
    fn count_hits(&self, text: &str) -> (u32, u32) {
        let lowered = text.to_lowercase();
        let mut positive = 0;
        let mut negative = 0;
        for hit in self.matcher.find_iter(&lowered) {
            if !is_word_boundary(&lowered, hit.start(), hit.end()) {
                continue;
            }
            match self.polarity[hit.pattern().as_usize()] {
                Polarity::Positive => positive += 1,
                Polarity::Negative => negative += 1,
            }
        }
        (positive, negative)
    }
}

fn is_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphabetic) && !after.is_some_and(char::is_alphabetic)
}

impl SentimentModel for LexiconModel {
    fn predict(&self, text: &str) -> Result<Vec<RawPrediction>> {
        let (positive, negative) = self.count_hits(text);
        let total = (positive + negative) as f32;

        let prediction = match self.spec.schema {
            OutputSchema::Binary => {
                // Laplace-smoothed probability of the positive class.
                let p_positive = (positive as f32 + 1.0) / (total + 2.0);
                if p_positive >= 0.5 {
                    RawPrediction::new("POSITIVE", p_positive)
                } else {
                    RawPrediction::new("NEGATIVE", 1.0 - p_positive)
                }
            }
            OutputSchema::StarRating => {
                let polarity = if total == 0.0 {
                    0.0
                } else {
                    (positive as f32 - negative as f32) / total
                };
                let stars = (3.0 + (2.0 * polarity).round()).clamp(1.0, 5.0) as u8;
                let dominant = positive.max(negative) as f32;
                let score = (dominant + 1.0) / (total + 2.0);
                let label = if stars == 1 {
                    "1 star".to_string()
                } else {
                    format!("{stars} stars")
                };
                RawPrediction::new(label, score)
            }
        };

        Ok(vec![prediction])
    }

    fn spec(&self) -> &ModelSpec {
        &self.spec
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconLoader;

impl ModelLoader for LexiconLoader {
    fn load(&self, spec: &ModelSpec) -> std::result::Result<ModelHandle, LoadError> {
        tracing::debug!(model = %spec.model_id, "building lexicon classifier");
        Ok(Arc::new(LexiconModel::new(spec.clone())?))
    }

    fn backend(&self) -> &'static str {
        "lexicon"
    }
}
