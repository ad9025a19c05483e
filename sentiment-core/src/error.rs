use thiserror::Error;

/// Failure to bring a backing model into memory. Never cached by the registry.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("model {model} not found: {reason}")]
    NotFound { model: String, reason: String },

    #[error("model {model} has an invalid format: {reason}")]
    Format { model: String, reason: String },

    #[error("model {model} could not be initialised: {reason}")]
    Runtime { model: String, reason: String },

    #[error("backend {0} is not available in this build")]
    BackendUnavailable(String),
}

/// Failure while invoking an already-loaded model on one text.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("tokenization failed: {0}")]
    Tokenization(String),

    #[error("model forward pass failed: {0}")]
    Forward(String),

    #[error("model returned {0} predictions, expected exactly one")]
    PredictionCount(usize),

    #[error("model panicked: {0}")]
    Panicked(String),
}

pub type Result<T, E = InferenceError> = std::result::Result<T, E>;

/// Text carried by a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
