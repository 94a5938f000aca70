use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use pokemon_migrate::cache::MemoryCache;
use pokemon_migrate::error::MigrateError;
use pokemon_migrate::http::{Fetcher, ListFetcher};
use pokemon_migrate::migrate::{MigrationRun, ProgressEvent, ProgressSink, RowStatus, SOURCE_ID_FIELD};
use pokemon_migrate::output::JsonOutput;
use pokemon_migrate::source::PokemonSource;

const LIST_URL: &str = "https://pokeapi.co/api/v2/pokemon";

struct MockList {
    body: Option<String>,
}

impl ListFetcher for MockList {
    fn response_content(&self, url: &str) -> Result<String, MigrateError> {
        self.body.clone().ok_or_else(|| MigrateError::Network {
            url: url.to_string(),
            message: "operation timed out".to_string(),
        })
    }
}

#[derive(Default)]
struct MockApi {
    documents: HashMap<String, Value>,
}

impl MockApi {
    fn with(mut self, url: &str, document: Value) -> Self {
        self.documents.insert(url.to_string(), document);
        self
    }
}

impl Fetcher for MockApi {
    fn get(&self, url: &str) -> Result<String, MigrateError> {
        self.documents
            .get(url)
            .map(Value::to_string)
            .ok_or_else(|| MigrateError::Network {
                url: url.to_string(),
                message: "server returned status 500 Internal Server Error".to_string(),
            })
    }

    fn head(&self, url: &str) -> Result<(), MigrateError> {
        self.get(url).map(|_| ())
    }
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn list_body(urls: &[&str]) -> String {
    let results = urls
        .iter()
        .map(|url| json!({"name": "pokemon", "url": url}))
        .collect::<Vec<_>>();
    json!({"count": urls.len(), "results": results}).to_string()
}

#[test]
fn failed_rows_are_recorded_and_run_continues() {
    let ok_one = "https://pokeapi.co/api/v2/pokemon/1/";
    let broken = "https://pokeapi.co/api/v2/pokemon/2/";
    let ok_three = "https://pokeapi.co/api/v2/pokemon/3/";
    let api = MockApi::default()
        .with(ok_one, json!({"id": 1, "name": "bulbasaur", "height": 7}))
        .with(
            broken,
            json!({"id": 2, "name": "ivysaur", "species": {"url": "https://pokeapi.co/api/v2/pokemon-species/2/"}}),
        )
        .with(ok_three, json!({"id": 3, "name": "venusaur", "weight": 1000}));
    let lister = MockList {
        body: Some(list_body(&[ok_one, broken, ok_three])),
    };
    let run = MigrationRun::new(lister, PokemonSource::new(api, MemoryCache::new()));
    let sink = RecordingSink::default();

    let report = run.run(LIST_URL, &sink).unwrap();

    assert_eq!(report.rows.len(), 2);
    assert_eq!(report.rows[0].get(SOURCE_ID_FIELD), Some(&json!(ok_one)));
    assert_eq!(report.rows[0].get("height_cm"), Some(&json!(70)));
    assert_eq!(report.rows[1].get("weight_kg"), Some(&json!(100.0)));
    assert!(report.rows.iter().all(|row| row.get("id") != Some(&json!(2))));

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].src_url, broken);
    assert!(report.failures[0].message.contains("pokemon-species/2"));

    let ids = BTreeMap::from([(SOURCE_ID_FIELD.to_string(), broken.to_string())]);
    let entry = report.id_map.get(&ids).unwrap();
    assert_eq!(entry.status, RowStatus::Failed);
    assert_eq!(entry.messages.len(), 1);
    assert_eq!(report.id_map.failed().count(), 1);
    assert_eq!(report.id_map.len(), 3);

    let messages = sink.messages.lock().unwrap();
    assert!(messages.iter().any(|message| message.contains("3 rows to process")));
}

#[test]
fn list_failure_aborts_the_run() {
    let run = MigrationRun::new(
        MockList { body: None },
        PokemonSource::new(MockApi::default(), MemoryCache::new()),
    );
    assert_matches!(
        run.run(LIST_URL, &JsonOutput),
        Err(MigrateError::Network { .. })
    );
}

#[test]
fn report_serializes_rows_and_failures() {
    let url = "https://pokeapi.co/api/v2/pokemon/25/";
    let api = MockApi::default().with(url, json!({"id": 25, "name": "pikachu"}));
    let run = MigrationRun::new(
        MockList {
            body: Some(list_body(&[url, "https://pokeapi.co/api/v2/pokemon/9999/"])),
        },
        PokemonSource::new(api, MemoryCache::new()),
    );
    let report = run.run(LIST_URL, &JsonOutput).unwrap();
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["list_url"], json!(LIST_URL));
    assert_eq!(value["rows"][0]["name"], json!("pikachu"));
    assert_eq!(value["rows"][0]["src_url"], json!(url));
    assert_eq!(
        value["failures"][0]["src_url"],
        json!("https://pokeapi.co/api/v2/pokemon/9999/")
    );
    assert_eq!(
        value["id_map"][format!("src_url={url}")]["status"],
        json!("imported")
    );
}
