use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Number, Value, json};
use tracing::debug;

use crate::cache::{CacheBackend, DEFAULT_TTL, cache_key};
use crate::error::MigrateError;
use crate::evolution::EvolutionNode;
use crate::http::Fetcher;
use crate::value::{is_empty, non_empty_str};

/// One flattened migration row. Enrichment only ever adds fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SourceRecord(Map<String, Value>);

impl SourceRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Migration source that expands a Pokémon URL into a flat row by walking
/// pokemon -> species -> evolution chain, with every document fetch cached.
pub struct PokemonSource<F: Fetcher, C: CacheBackend> {
    fetcher: F,
    cache: C,
    ttl: Duration,
}

impl<F: Fetcher, C: CacheBackend> PokemonSource<F, C> {
    pub fn new(fetcher: F, cache: C) -> Self {
        Self {
            fetcher,
            cache,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetches and decodes `url`, consulting the cache first. Only non-empty
    /// documents are stored; failures are never cached.
    pub fn fetch_api_data(&self, url: &str) -> Result<Value, MigrateError> {
        let key = cache_key(url);
        if let Some(data) = self.cache.get(&key) {
            debug!(url, "cache hit");
            return Ok(data);
        }

        let body = self.fetcher.get(url)?;
        let data: Value = serde_json::from_str(&body).map_err(|err| MigrateError::InvalidJson {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        if is_empty(&data) {
            return Err(MigrateError::MissingData {
                url: url.to_string(),
                detail: "empty document".to_string(),
            });
        }

        self.cache.set(&key, data.clone(), self.ttl);
        Ok(data)
    }

    /// Builds the row for `seed_url`. Any failed hop fails the whole row; a
    /// partially filled record is never returned.
    pub fn enrich(&self, seed_url: &str) -> Result<SourceRecord, MigrateError> {
        let pokemon = self.fetch_api_data(seed_url)?;
        let Value::Object(fields) = &pokemon else {
            return Err(MigrateError::MissingData {
                url: seed_url.to_string(),
                detail: "pokemon document is not an object".to_string(),
            });
        };

        let mut record = SourceRecord::default();
        for (key, value) in fields {
            record.set(key.clone(), value.clone());
        }

        // Height is served in decimetres, weight in hectograms.
        if let Some(height_cm) = fields.get("height").and_then(decimetres_to_cm) {
            record.set("height_cm", height_cm);
        }
        if let Some(weight_kg) = fields.get("weight").and_then(hectograms_to_kg) {
            record.set("weight_kg", weight_kg);
        }

        let Some(species_url) = non_empty_str(&pokemon, &["species", "url"]) else {
            return Ok(record);
        };
        let species = self.fetch_api_data(species_url)?;
        add_names(&mut record, &species);
        add_flavor_text(&mut record, &species);

        if let Some(chain_url) = non_empty_str(&species, &["evolution_chain", "url"]) {
            let evolution = self.fetch_api_data(chain_url)?;
            let chain = EvolutionNode::from_document(chain_url, &evolution)?;
            record.set("evolution_chain", json!(chain.flatten()));
        }

        Ok(record)
    }
}

fn decimetres_to_cm(value: &Value) -> Option<Value> {
    match value.as_i64() {
        Some(whole) => whole.checked_mul(10).map(Value::from),
        None => Number::from_f64(value.as_f64()? * 10.0).map(Value::Number),
    }
}

fn hectograms_to_kg(value: &Value) -> Option<Value> {
    match value.as_i64() {
        Some(whole) if whole % 10 == 0 => Some(Value::from(whole / 10)),
        _ => Number::from_f64(value.as_f64()? / 10.0).map(Value::Number),
    }
}

fn add_names(record: &mut SourceRecord, species: &Value) {
    let Some(names) = species.get("names").and_then(Value::as_array) else {
        return;
    };
    for entry in names {
        if let Some(language) = non_empty_str(entry, &["language", "name"]) {
            record.set(format!("name_{language}"), text_or_empty(entry.get("name")));
        }
    }
}

fn add_flavor_text(record: &mut SourceRecord, species: &Value) {
    let Some(entries) = species.get("flavor_text_entries").and_then(Value::as_array) else {
        return;
    };
    for entry in entries {
        let language = non_empty_str(entry, &["language", "name"]);
        let version = non_empty_str(entry, &["version", "name"]);
        if let (Some(language), Some(version)) = (language, version) {
            record.set(
                format!("flavor_text_{language}_{version}"),
                text_or_empty(entry.get("flavor_text")),
            );
        }
    }
}

fn text_or_empty(value: Option<&Value>) -> Value {
    match value {
        Some(value) if !value.is_null() => value.clone(),
        _ => Value::String(String::new()),
    }
}
