use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::cache::CacheBackend;
use crate::error::MigrateError;
use crate::http::{Fetcher, ListFetcher};
use crate::source::{PokemonSource, SourceRecord};

/// Source property that identifies a row.
pub const SOURCE_ID_FIELD: &str = "src_url";

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Imported,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdMapEntry {
    pub source_ids: BTreeMap<String, String>,
    pub status: RowStatus,
    pub messages: Vec<String>,
}

/// Per-row bookkeeping keyed by source id values.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct IdMap {
    entries: BTreeMap<String, IdMapEntry>,
}

impl IdMap {
    fn entry(&mut self, source_ids: &BTreeMap<String, String>) -> &mut IdMapEntry {
        let key = id_key(source_ids);
        self.entries.entry(key).or_insert_with(|| IdMapEntry {
            source_ids: source_ids.clone(),
            status: RowStatus::Imported,
            messages: Vec::new(),
        })
    }

    pub fn save_message(&mut self, source_ids: &BTreeMap<String, String>, message: &str) {
        self.entry(source_ids).messages.push(message.to_string());
    }

    pub fn save_id_mapping(&mut self, source_ids: &BTreeMap<String, String>, status: RowStatus) {
        self.entry(source_ids).status = status;
    }

    pub fn get(&self, source_ids: &BTreeMap<String, String>) -> Option<&IdMapEntry> {
        self.entries.get(&id_key(source_ids))
    }

    pub fn failed(&self) -> impl Iterator<Item = &IdMapEntry> {
        self.entries
            .values()
            .filter(|entry| entry.status == RowStatus::Failed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn id_key(source_ids: &BTreeMap<String, String>) -> String {
    source_ids
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Clone, Serialize)]
pub struct RowFailure {
    pub src_url: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub list_url: String,
    pub rows: Vec<SourceRecord>,
    pub failures: Vec<RowFailure>,
    pub id_map: IdMap,
}

/// Reads seed URLs out of a list response: `results[].url`, in order.
pub fn seed_urls(list_url: &str, body: &str) -> Result<Vec<String>, MigrateError> {
    let document: Value = serde_json::from_str(body).map_err(|err| MigrateError::InvalidJson {
        url: list_url.to_string(),
        message: err.to_string(),
    })?;
    let results = document
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| MigrateError::MissingData {
            url: list_url.to_string(),
            detail: "list response has no results".to_string(),
        })?;
    Ok(results
        .iter()
        .filter_map(|item| item.get("url").and_then(Value::as_str))
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect())
}

pub struct MigrationRun<L: ListFetcher, F: Fetcher, C: CacheBackend> {
    lister: L,
    source: PokemonSource<F, C>,
}

impl<L: ListFetcher, F: Fetcher, C: CacheBackend> MigrationRun<L, F, C> {
    pub fn new(lister: L, source: PokemonSource<F, C>) -> Self {
        Self { lister, source }
    }

    pub fn source(&self) -> &PokemonSource<F, C> {
        &self.source
    }

    /// Lists seed URLs and enriches each one. A failed list fetch aborts the
    /// run; a failed row is logged, marked failed, and skipped.
    pub fn run(&self, list_url: &str, sink: &dyn ProgressSink) -> Result<RunReport, MigrateError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=List; fetching {list_url}"),
            elapsed: None,
        });
        let body = self.lister.response_content(list_url)?;
        let seeds = seed_urls(list_url, &body)?;
        sink.event(ProgressEvent {
            message: format!("phase=List; {} rows to process", seeds.len()),
            elapsed: Some(started.elapsed()),
        });

        let mut report = RunReport {
            list_url: list_url.to_string(),
            rows: Vec::new(),
            failures: Vec::new(),
            id_map: IdMap::default(),
        };

        for (index, seed) in seeds.iter().enumerate() {
            let source_ids = BTreeMap::from([(SOURCE_ID_FIELD.to_string(), seed.clone())]);
            match self.source.enrich(seed) {
                Ok(mut record) => {
                    record.set(SOURCE_ID_FIELD, json!(seed));
                    report.id_map.save_id_mapping(&source_ids, RowStatus::Imported);
                    report.rows.push(record);
                }
                Err(err) => {
                    let message = err.to_string();
                    warn!(src_url = %seed, %message, "skipping row");
                    report.id_map.save_message(&source_ids, &message);
                    report.id_map.save_id_mapping(&source_ids, RowStatus::Failed);
                    report.failures.push(RowFailure {
                        src_url: seed.clone(),
                        message,
                    });
                }
            }
            sink.event(ProgressEvent {
                message: format!("phase=Rows; {}/{} {seed}", index + 1, seeds.len()),
                elapsed: Some(started.elapsed()),
            });
        }

        Ok(report)
    }
}
