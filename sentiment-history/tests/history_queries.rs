use chrono::{Duration, Utc};
use sentiment_core::{HistorySink, Language, Sentiment};
use sentiment_history::{HistoryQuery, HistoryStore};

fn seeded_store(dir: &std::path::Path) -> HistoryStore {
    let store = HistoryStore::open(dir).unwrap();
    let rows = [
        ("loved it", Sentiment::Positive, 0.91),
        ("hated it", Sentiment::Negative, 0.88),
        ("fine", Sentiment::Neutral, 0.5),
        ("great", Sentiment::Positive, 0.95),
        ("awful", Sentiment::Negative, 0.7),
    ];
    for (text, sentiment, confidence) in rows {
        store.append(text, sentiment, confidence, &Language::En).unwrap();
    }
    store
}

#[test]
fn history_is_newest_first_and_paginated() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path());

    let page = store
        .query(&HistoryQuery {
            limit: 2,
            offset: 1,
            sentiment: None,
        })
        .unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(page.limit, 2);
    assert_eq!(page.offset, 1);
    let texts: Vec<&str> = page.history.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["great", "fine"]);
}

#[test]
fn sentiment_filter_is_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path());

    let page = store
        .query(&HistoryQuery {
            sentiment: Some("negative".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 2);
    let ids: Vec<u64> = page.history.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![5, 2]);

    let nothing = store
        .query(&HistoryQuery {
            sentiment: Some("ecstatic".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(nothing.total, 0);
    assert!(nothing.history.is_empty());
}

#[test]
fn offset_past_the_end_yields_an_empty_page() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path());
    let page = store
        .query(&HistoryQuery {
            offset: 50,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(page.total, 5);
    assert!(page.history.is_empty());
}

#[test]
fn stats_aggregate_the_whole_log() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path());

    let stats = store.stats().unwrap();
    assert_eq!(stats.total_analyses, 5);
    assert_eq!(stats.sentiment_distribution[&Sentiment::Positive], 2);
    assert_eq!(stats.sentiment_distribution[&Sentiment::Negative], 2);
    assert_eq!(stats.sentiment_distribution[&Sentiment::Neutral], 1);
    assert_eq!(stats.average_confidence[&Sentiment::Positive], 0.93);
    assert_eq!(stats.average_confidence[&Sentiment::Negative], 0.79);
    assert_eq!(stats.recent_24h_trend.values().sum::<usize>(), 5);

    let tomorrow = store.stats_at(Utc::now() + Duration::hours(25)).unwrap();
    assert!(tomorrow.recent_24h_trend.is_empty());
    assert_eq!(tomorrow.total_analyses, 5);
}

#[test]
fn empty_store_has_empty_stats() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::open(dir.path()).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.total_analyses, 0);
    assert!(stats.sentiment_distribution.is_empty());

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["sentiment_distribution"], serde_json::json!({}));
}

#[test]
fn csv_export_has_header_and_quotes_text() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::open(dir.path()).unwrap();
    assert_eq!(
        store.export_csv().unwrap().trim_end(),
        "id,text,sentiment,confidence,language,timestamp"
    );

    store
        .append("good, really \"good\"", Sentiment::Positive, 0.9, &Language::Fr)
        .unwrap();
    let csv = store.export_csv().unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("id,text,sentiment,confidence,language,timestamp")
    );
    let row = lines.next().unwrap();
    assert!(
        row.starts_with("1,\"good, really \"\"good\"\"\",POSITIVE,0.9,fr,"),
        "{row}"
    );
}

#[test]
fn json_export_matches_query_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store(dir.path());
    let exported = store.export().unwrap();
    assert_eq!(exported.len(), 5);
    assert_eq!(exported[0].id, 5);

    let json = serde_json::to_value(&exported[0]).unwrap();
    assert_eq!(json["sentiment"], "NEGATIVE");
    assert_eq!(json["language"], "en");
}

#[test]
fn store_works_as_a_history_sink() {
    let dir = tempfile::tempdir().unwrap();
    let store = HistoryStore::open(dir.path()).unwrap();
    let sink: &dyn HistorySink = &store;
    let id = sink
        .append("bien", Sentiment::Positive, 0.6, &Language::Es)
        .unwrap();
    assert_eq!(id, 1);
    assert_eq!(store.len().unwrap(), 1);
}
