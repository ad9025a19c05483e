//! Request bodies and their validation into core requests.

use sentiment_core::{AnalysisRequest, BatchRequest, Language};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeBody {
    #[serde(default)]
    pub text: Option<Value>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub save_history: Option<bool>,
}

impl AnalyzeBody {
    pub fn into_request(self) -> Result<AnalysisRequest, ApiError> {
        let text = match self.text {
            None => return Err(ApiError::BadRequest("Missing required field: text".into())),
            Some(Value::String(text)) => text,
            Some(_) => return Err(ApiError::BadRequest("text must be a string".into())),
        };
        if text.is_empty() {
            return Err(ApiError::BadRequest("Text cannot be empty".into()));
        }

        Ok(AnalysisRequest::new(text)
            .with_language(language_or_default(self.language))
            .save_history(self.save_history.unwrap_or(true)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchBody {
    #[serde(default)]
    pub texts: Option<Value>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub save_history: Option<bool>,
}

impl BatchBody {
    pub fn into_request(self, max_batch_size: usize) -> Result<BatchRequest, ApiError> {
        let items = match self.texts {
            None => return Err(ApiError::BadRequest("Missing required field: texts".into())),
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ApiError::BadRequest("texts must be a list".into())),
        };
        if items.len() > max_batch_size {
            return Err(ApiError::BadRequest(format!(
                "Maximum {max_batch_size} texts per batch"
            )));
        }

        let texts = items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => Ok(text),
                _ => Err(ApiError::BadRequest("texts must contain only strings".into())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BatchRequest::new(texts)
            .with_language(language_or_default(self.language))
            .save_history(self.save_history.unwrap_or(true)))
    }
}

fn language_or_default(language: Option<String>) -> Language {
    language.map(Language::from).unwrap_or_default()
}
