use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Canonical three-way sentiment. The only values ever returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Neutral => "NEUTRAL",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sentiment {0:?}")]
pub struct UnknownSentiment(pub String);

impl FromStr for Sentiment {
    type Err = UnknownSentiment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "POSITIVE" => Ok(Sentiment::Positive),
            "NEGATIVE" => Ok(Sentiment::Negative),
            "NEUTRAL" => Ok(Sentiment::Neutral),
            _ => Err(UnknownSentiment(s.to_string())),
        }
    }
}

/// Language tag selecting the backing model.
///
/// Unrecognised tags are kept verbatim in [`Language::Other`] and routed to the
/// multilingual model; they are never rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    #[default]
    En,
    Es,
    Fr,
    De,
    Multilingual,
    Other(String),
}

impl Language {
    pub const SUPPORTED: [&'static str; 5] = ["en", "es", "fr", "de", "multilingual"];

    pub fn as_str(&self) -> &str {
        match self {
            Language::En => "en",
            Language::Es => "es",
            Language::Fr => "fr",
            Language::De => "de",
            Language::Multilingual => "multilingual",
            Language::Other(tag) => tag,
        }
    }
}

impl From<&str> for Language {
    fn from(tag: &str) -> Self {
        match tag {
            "en" => Language::En,
            "es" => Language::Es,
            "fr" => Language::Fr,
            "de" => Language::De,
            "multilingual" => Language::Multilingual,
            other => Language::Other(other.to_string()),
        }
    }
}

impl From<String> for Language {
    fn from(tag: String) -> Self {
        Language::from(tag.as_str())
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.as_str().to_string()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated single-text request. Built at the boundary, never by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub text: String,
    pub language: Language,
    pub save_history: bool,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: Language::default(),
            save_history: true,
        }
    }

    pub fn with_language(mut self, language: impl Into<Language>) -> Self {
        self.language = language.into();
        self
    }

    pub fn save_history(mut self, save: bool) -> Self {
        self.save_history = save;
        self
    }
}

/// A validated batch request; the item cap is enforced before this is built.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub texts: Vec<String>,
    pub language: Language,
    pub save_history: bool,
}

impl BatchRequest {
    pub fn new(texts: Vec<String>) -> Self {
        Self {
            texts,
            language: Language::default(),
            save_history: true,
        }
    }

    pub fn with_language(mut self, language: impl Into<Language>) -> Self {
        self.language = language.into();
        self
    }

    pub fn save_history(mut self, save: bool) -> Self {
        self.save_history = save;
        self
    }
}

/// Outcome of analysing one text.
///
/// Successful results carry `sentiment` and `confidence`; failed results carry
/// `error`. Text that is empty after preprocessing carries both a neutral
/// sentiment with zero confidence and the error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "text")]
    pub original_text: String,
    #[serde(rename = "processed_text")]
    pub normalized_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub language: Language,
    pub processing_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate outcome of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment_distribution: Option<BTreeMap<Sentiment, usize>>,
}

impl BatchStatistics {
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        let total = results.len();
        let mut successful = 0;
        let mut distribution: BTreeMap<Sentiment, usize> =
            Sentiment::ALL.iter().map(|s| (*s, 0)).collect();

        for result in results.iter().filter(|r| r.is_success()) {
            successful += 1;
            if let Some(sentiment) = result.sentiment {
                *distribution.entry(sentiment).or_insert(0) += 1;
            }
        }

        Self {
            total,
            successful,
            failed: total - successful,
            sentiment_distribution: (successful > 0).then_some(distribution),
        }
    }
}
