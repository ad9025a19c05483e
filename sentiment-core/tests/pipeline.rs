use std::sync::Arc;

use sentiment_core::model::{LexiconLoader, MULTILINGUAL_MODEL_ID};
use sentiment_core::{
    AnalysisRequest, Backend, BatchRequest, CacheKeying, EngineConfig, Language, LoadError,
    ModelRegistry, Sentiment, SentimentService,
};

#[test]
fn spanish_and_french_share_a_model_id() {
    let registry = ModelRegistry::new(Arc::new(LexiconLoader));
    assert_eq!(registry.resolve(&Language::Es).model_id, MULTILINGUAL_MODEL_ID);
    assert_eq!(
        registry.resolve(&Language::Es),
        registry.resolve(&Language::Fr)
    );
}

#[test]
fn cache_keying_controls_handle_sharing() {
    let by_tag = SentimentService::from_config(&EngineConfig::default()).unwrap();
    let by_model = SentimentService::from_config(&EngineConfig {
        cache_keying: CacheKeying::ModelId,
        ..EngineConfig::default()
    })
    .unwrap();

    for service in [&by_tag, &by_model] {
        service.analyze(&AnalysisRequest::new("excelente").with_language("es"));
        service.analyze(&AnalysisRequest::new("magnifique").with_language("fr"));
    }

    assert_eq!(by_tag.models_loaded(), vec!["es", "fr"]);
    assert_eq!(by_model.models_loaded(), vec![MULTILINGUAL_MODEL_ID]);
}

#[test]
fn results_echo_language_and_timing() {
    let service = SentimentService::from_config(&EngineConfig::default()).unwrap();
    let texts = ["Das ist gut", "c'est mauvais", "I am so happy today", "ok"];
    for (text, tag) in texts.iter().zip(["de", "fr", "en", "multilingual"]) {
        let result = service.analyze(&AnalysisRequest::new(*text).with_language(tag));
        assert!(result.is_success(), "{result:?}");
        assert_eq!(result.language.as_str(), tag);
        assert!(result.processing_time_seconds >= 0.0);
        let confidence = result.confidence.unwrap();
        assert!((0.0..=1.0).contains(&confidence));
    }
}

#[test]
fn star_ratings_collapse_to_three_way_sentiment() {
    let service = SentimentService::from_config(&EngineConfig::default()).unwrap();
    let cases = [
        ("Ich liebe es, wunderbar", Sentiment::Positive),
        ("schlecht und furchtbar", Sentiment::Negative),
        ("Der Zug kommt um acht", Sentiment::Neutral),
    ];
    for (text, expected) in cases {
        let result = service.analyze(&AnalysisRequest::new(text).with_language("de"));
        assert_eq!(result.sentiment, Some(expected), "{text}");
    }
}

#[test]
fn parallel_batches_match_sequential_output() {
    let texts: Vec<String> = ["great", "", "bad", "https://a.io", "love it", "meh"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let request = BatchRequest::new(texts).save_history(false);

    let sequential = SentimentService::from_config(&EngineConfig::default()).unwrap();
    let parallel = SentimentService::from_config(&EngineConfig {
        parallel_batches: true,
        ..EngineConfig::default()
    })
    .unwrap();

    let (a, stats_a) = sequential.analyze_batch(&request);
    let (b, stats_b) = parallel.analyze_batch(&request);

    assert_eq!(stats_a, stats_b);
    assert_eq!(stats_a.total, 6);
    assert_eq!(stats_a.failed, 2);
    let sentiments = |results: &[sentiment_core::AnalysisResult]| {
        results.iter().map(|r| r.sentiment).collect::<Vec<_>>()
    };
    assert_eq!(sentiments(&a), sentiments(&b));
}

#[cfg(not(feature = "candle"))]
#[test]
fn candle_backend_requires_the_feature() {
    let err = SentimentService::from_config(&EngineConfig {
        backend: Backend::Candle,
        ..EngineConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, LoadError::BackendUnavailable(_)));
}
