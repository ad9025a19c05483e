use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// API keys accepted on the `/api` routes.
///
/// By default authentication is advisory: requests without a key pass, a
/// presented key must be known. [`require_keys`](Self::require_keys) rejects
/// keyless requests too.
#[derive(Debug, Clone, Default)]
pub struct ApiAuth {
    keys: Arc<RwLock<HashSet<String>>>,
    require_keys: bool,
}

impl ApiAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let auth = Self::new();
        for key in keys {
            auth.insert(key);
        }
        auth
    }

    pub fn require_keys(mut self) -> Self {
        self.require_keys = true;
        self
    }

    pub fn insert(&self, key: impl Into<String>) {
        let mut guard = match self.keys.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(key.into());
    }

    pub fn key_count(&self) -> usize {
        match self.keys.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn authenticate(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let presented = headers
            .get(API_KEY_HEADER)
            .map(|value| value.to_str().unwrap_or_default())
            .filter(|key| !key.is_empty());

        let Some(key) = presented else {
            return if self.require_keys {
                Err(ApiError::Unauthorized("Missing API key".into()))
            } else {
                Ok(())
            };
        };

        let guard = match self.keys.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.contains(key) {
            Ok(())
        } else {
            tracing::debug!("rejected request with unknown api key");
            Err(ApiError::Unauthorized("Invalid API key".into()))
        }
    }
}

pub(crate) async fn require_api_key(
    State(auth): State<ApiAuth>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    auth.authenticate(request.headers())?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(key: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = key {
            headers.insert(API_KEY_HEADER, HeaderValue::from_static(key));
        }
        headers
    }

    #[test]
    fn keyless_requests_pass_unless_keys_are_required() {
        let auth = ApiAuth::with_keys(["demo"]);
        assert!(auth.authenticate(&headers(None)).is_ok());
        assert!(auth.authenticate(&headers(Some("demo"))).is_ok());

        let strict = auth.clone().require_keys();
        let err = strict.authenticate(&headers(None)).unwrap_err();
        assert_eq!(err.to_string(), "Missing API key");
    }

    #[test]
    fn empty_key_counts_as_absent() {
        let auth = ApiAuth::with_keys(["demo"]);
        assert!(auth.authenticate(&headers(Some(""))).is_ok());

        let err = auth.require_keys().authenticate(&headers(Some(""))).unwrap_err();
        assert_eq!(err.to_string(), "Missing API key");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let auth = ApiAuth::new();
        let err = auth.authenticate(&headers(Some("guess"))).unwrap_err();
        assert_eq!(err.to_string(), "Invalid API key");

        auth.insert("guess");
        assert!(auth.authenticate(&headers(Some("guess"))).is_ok());
        assert_eq!(auth.key_count(), 1);
    }
}
