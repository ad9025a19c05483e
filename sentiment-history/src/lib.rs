//! Append-only history of analysed texts.
//!
//! Records live in memory and in `history.jsonl` under the store root. Every
//! append writes and flushes one line before the record becomes visible;
//! opening a store replays the log.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use sentiment_core::{HistorySink, Language, Sentiment, SinkError};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: usize = 100;
const LOG_FILE: &str = "history.jsonl";

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("corrupt history log at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },

    #[error("history store lock poisoned")]
    Poisoned,
}

/// One persisted analysis. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: u64,
    pub text: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub language: Language,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub limit: usize,
    pub offset: usize,
    /// Matched case-insensitively against the stored sentiment. A value that
    /// names no sentiment matches nothing.
    pub sentiment: Option<String>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
            sentiment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub history: Vec<HistoryRecord>,
    /// Matching records before pagination.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Aggregates over the whole log. Sentiments with no records are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_analyses: usize,
    pub sentiment_distribution: BTreeMap<Sentiment, usize>,
    pub average_confidence: BTreeMap<Sentiment, f64>,
    pub recent_24h_trend: BTreeMap<Sentiment, usize>,
}

#[derive(Debug)]
struct Inner {
    records: Vec<HistoryRecord>,
    next_id: u64,
    log: File,
}

#[derive(Debug)]
pub struct HistoryStore {
    root: PathBuf,
    inner: Mutex<Inner>,
}

impl HistoryStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let log_path = root.join(LOG_FILE);

        let (records, tail) = replay(&log_path)?;
        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        if let Tail::Torn { keep } = tail {
            OpenOptions::new().write(true).open(&log_path)?.set_len(keep)?;
        }
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        if tail == Tail::Unterminated {
            log.write_all(b"\n")?;
            log.flush()?;
        }

        tracing::info!(
            path = %log_path.display(),
            records = records.len(),
            "history store opened"
        );
        gauge!("history_records_total").set(records.len() as f64);

        Ok(Self {
            root,
            inner: Mutex::new(Inner {
                records,
                next_id,
                log,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> Result<usize, HistoryError> {
        Ok(self.lock()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, HistoryError> {
        Ok(self.len()? == 0)
    }

    /// Writes a record and returns it with its assigned id.
    pub fn append(
        &self,
        text: &str,
        sentiment: Sentiment,
        confidence: f64,
        language: &Language,
    ) -> Result<HistoryRecord, HistoryError> {
        let mut inner = self.lock()?;
        let record = HistoryRecord {
            id: inner.next_id,
            text: text.to_string(),
            sentiment,
            confidence,
            language: language.clone(),
            timestamp: Utc::now(),
        };

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        inner.log.write_all(line.as_bytes())?;
        inner.log.flush()?;

        inner.next_id += 1;
        inner.records.push(record.clone());

        counter!("history_appends_total", "sentiment" => sentiment.as_str()).increment(1);
        gauge!("history_records_total").set(inner.records.len() as f64);
        Ok(record)
    }

    /// Newest first, filtered then paginated.
    pub fn query(&self, query: &HistoryQuery) -> Result<HistoryPage, HistoryError> {
        let inner = self.lock()?;
        let wanted = query.sentiment.as_deref().map(|s| s.trim().to_ascii_uppercase());
        let matches = |record: &&HistoryRecord| {
            wanted
                .as_deref()
                .map_or(true, |wanted| record.sentiment.as_str() == wanted)
        };

        let total = inner.records.iter().filter(matches).count();
        let history = inner
            .records
            .iter()
            .rev()
            .filter(matches)
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();

        Ok(HistoryPage {
            history,
            total,
            limit: query.limit,
            offset: query.offset,
        })
    }

    pub fn stats(&self) -> Result<HistoryStats, HistoryError> {
        self.stats_at(Utc::now())
    }

    /// Statistics with the 24 hour window ending at `now`.
    pub fn stats_at(&self, now: DateTime<Utc>) -> Result<HistoryStats, HistoryError> {
        let inner = self.lock()?;
        let since = now - Duration::hours(24);

        let mut distribution = BTreeMap::new();
        let mut confidence_sums: BTreeMap<Sentiment, f64> = BTreeMap::new();
        let mut trend = BTreeMap::new();
        for record in &inner.records {
            *distribution.entry(record.sentiment).or_insert(0) += 1;
            *confidence_sums.entry(record.sentiment).or_insert(0.0) += record.confidence;
            if record.timestamp >= since {
                *trend.entry(record.sentiment).or_insert(0) += 1;
            }
        }

        let average_confidence = confidence_sums
            .into_iter()
            .map(|(sentiment, sum)| {
                let count = distribution.get(&sentiment).copied().unwrap_or(1) as f64;
                (sentiment, round4(sum / count))
            })
            .collect();

        Ok(HistoryStats {
            total_analyses: inner.records.len(),
            sentiment_distribution: distribution,
            average_confidence,
            recent_24h_trend: trend,
        })
    }

    /// Every record, newest first.
    pub fn export(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let inner = self.lock()?;
        Ok(inner.records.iter().rev().cloned().collect())
    }

    /// Every record, newest first, as CSV with a header row.
    pub fn export_csv(&self) -> Result<String, HistoryError> {
        let records = self.export()?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        if records.is_empty() {
            writer.write_record(["id", "text", "sentiment", "confidence", "language", "timestamp"])?;
        }
        for record in &records {
            writer.serialize(record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| HistoryError::Io(e.into_error()))?;
        String::from_utf8(bytes).map_err(|e| HistoryError::Corrupt {
            line: 0,
            reason: e.to_string(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, HistoryError> {
        self.inner.lock().map_err(|_| HistoryError::Poisoned)
    }
}

impl HistorySink for HistoryStore {
    fn append(
        &self,
        text: &str,
        sentiment: Sentiment,
        confidence: f64,
        language: &Language,
    ) -> Result<u64, SinkError> {
        let record = HistoryStore::append(self, text, sentiment, confidence, language)?;
        Ok(record.id)
    }
}

/// State of the last line of the log after replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    Clean,
    /// Last line parsed but lacks its newline.
    Unterminated,
    /// Last line is a partial write; only the first `keep` bytes are whole records.
    Torn { keep: u64 },
}

fn replay(path: &Path) -> Result<(Vec<HistoryRecord>, Tail), HistoryError> {
    if !path.exists() {
        return Ok((Vec::new(), Tail::Clean));
    }
    let mut reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    let mut tail = Tail::Clean;
    let mut offset = 0u64;
    let mut buf = String::new();
    let mut index = 0;
    loop {
        buf.clear();
        let read = reader.read_line(&mut buf)?;
        if read == 0 {
            break;
        }
        index += 1;
        let terminated = buf.ends_with('\n');
        let line = buf.trim();

        if !line.is_empty() {
            match serde_json::from_str::<HistoryRecord>(line) {
                Ok(record) => records.push(record),
                // Only the final line can be cut short by a crash mid-write.
                Err(err) if !terminated => {
                    tracing::warn!(
                        path = %path.display(),
                        line = index,
                        error = %err,
                        "dropping partial record at end of history log"
                    );
                    tail = Tail::Torn { keep: offset };
                    break;
                }
                Err(err) => {
                    return Err(HistoryError::Corrupt {
                        line: index,
                        reason: err.to_string(),
                    })
                }
            }
        }
        if !terminated {
            tail = Tail::Unterminated;
        }
        offset += read as u64;
    }
    Ok((records, tail))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_start_at_one_and_increase() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path()).unwrap();

        let first = store
            .append("good", Sentiment::Positive, 0.9, &Language::En)
            .unwrap();
        let second = store
            .append("bad", Sentiment::Negative, 0.8, &Language::En)
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn log_replay_restores_records_and_id_sequence() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = HistoryStore::open(dir.path()).unwrap();
            store
                .append("uno", Sentiment::Positive, 0.7, &Language::Es)
                .unwrap();
            store
                .append("deux", Sentiment::Neutral, 0.5, &Language::from("pt"))
                .unwrap();
        }

        let store = HistoryStore::open(dir.path()).unwrap();
        let page = store.query(&HistoryQuery::default()).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.history[0].text, "deux");
        assert_eq!(page.history[0].language, Language::Other("pt".into()));
        assert_eq!(page.history[1].language, Language::Es);

        let next = store
            .append("drei", Sentiment::Negative, 0.6, &Language::De)
            .unwrap();
        assert_eq!(next.id, 3);
    }

    #[test]
    fn corrupt_lines_are_reported_with_position() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LOG_FILE), "\n{not json}\n").unwrap();
        let err = HistoryStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt { line: 2, .. }), "{err}");
    }

    #[test]
    fn missing_final_newline_is_restored_before_appending() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join(LOG_FILE);
        {
            let store = HistoryStore::open(dir.path()).unwrap();
            store
                .append("first", Sentiment::Positive, 0.9, &Language::En)
                .unwrap();
        }
        let contents = fs::read_to_string(&log_path).unwrap();
        fs::write(&log_path, contents.trim_end_matches('\n')).unwrap();

        {
            let store = HistoryStore::open(dir.path()).unwrap();
            assert_eq!(store.len().unwrap(), 1);
            let second = store
                .append("second", Sentiment::Negative, 0.8, &Language::En)
                .unwrap();
            assert_eq!(second.id, 2);
        }

        let store = HistoryStore::open(dir.path()).unwrap();
        let texts: Vec<String> = store.export().unwrap().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec!["second", "first"]);
    }

    #[test]
    fn partial_final_record_is_dropped_and_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join(LOG_FILE);
        {
            let store = HistoryStore::open(dir.path()).unwrap();
            store
                .append("kept", Sentiment::Neutral, 0.5, &Language::Fr)
                .unwrap();
        }
        let mut contents = fs::read_to_string(&log_path).unwrap();
        contents.push_str(r#"{"id":2,"text":"cut of"#);
        fs::write(&log_path, contents).unwrap();

        {
            let store = HistoryStore::open(dir.path()).unwrap();
            assert_eq!(store.len().unwrap(), 1);
            let next = store
                .append("after crash", Sentiment::Positive, 0.7, &Language::En)
                .unwrap();
            assert_eq!(next.id, 2);
        }

        let store = HistoryStore::open(dir.path()).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        let log = fs::read_to_string(&log_path).unwrap();
        assert!(!log.contains("cut of"));
        assert!(log.ends_with('\n'));
    }
}
