use std::collections::HashSet;

use pokemon_migrate::error::MigrateError;
use pokemon_migrate::http::Fetcher;
use pokemon_migrate::process::{ProcessSignal, SkipMethod, SkipOn404};
use url::Url;

#[derive(Default)]
struct MockRemote {
    existing: HashSet<String>,
}

impl MockRemote {
    fn with(mut self, url: &str) -> Self {
        self.existing.insert(url.to_string());
        self
    }
}

impl Fetcher for MockRemote {
    fn get(&self, url: &str) -> Result<String, MigrateError> {
        Err(MigrateError::Network {
            url: url.to_string(),
            message: "GET not expected".to_string(),
        })
    }

    fn head(&self, url: &str) -> Result<(), MigrateError> {
        if self.existing.contains(url) {
            Ok(())
        } else {
            Err(MigrateError::Network {
                url: url.to_string(),
                message: "server returned status 404 Not Found".to_string(),
            })
        }
    }
}

const SPRITE: &str = "https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon/1.png";
const MISSING: &str = "https://raw.githubusercontent.com/PokeAPI/sprites/master/sprites/pokemon/0.png";

#[test]
fn remote_files_pass_through_when_present() {
    let gate = SkipOn404::new(MockRemote::default().with(SPRITE), SkipMethod::Row);
    assert_eq!(gate.transform(SPRITE), Ok(SPRITE));
}

#[test]
fn row_mode_skips_the_row() {
    let gate = SkipOn404::new(MockRemote::default(), SkipMethod::Row);
    assert_eq!(
        gate.transform(MISSING),
        Err(ProcessSignal::SkipRow(format!("404 - {MISSING} does not exist")))
    );
}

#[test]
fn process_mode_skips_only_the_field() {
    let gate = SkipOn404::new(MockRemote::default(), SkipMethod::Process);
    assert_eq!(gate.transform(MISSING), Err(ProcessSignal::SkipField));
}

#[test]
fn local_paths_use_the_filesystem() {
    let temp = tempfile::tempdir().unwrap();
    let present = temp.path().join("1.png");
    std::fs::write(&present, b"png").unwrap();
    let absent = temp.path().join("0.png");

    let gate = SkipOn404::new(MockRemote::default(), SkipMethod::Process);
    assert!(gate.exists(present.to_str().unwrap()));
    assert!(gate.exists(temp.path().to_str().unwrap()));
    assert!(!gate.exists(absent.to_str().unwrap()));
}

#[test]
fn file_urls_check_the_local_file() {
    let temp = tempfile::tempdir().unwrap();
    let present = temp.path().join("1.png");
    std::fs::write(&present, b"png").unwrap();
    let present_url = Url::from_file_path(&present).unwrap();
    let absent_url = Url::from_file_path(temp.path().join("0.png")).unwrap();

    let gate = SkipOn404::new(MockRemote::default(), SkipMethod::Row);
    assert!(gate.exists(present_url.as_str()));
    assert_eq!(gate.transform(present_url.as_str()), Ok(present_url.as_str()));
    assert!(!gate.exists(absent_url.as_str()));
}

#[test]
fn protocol_relative_locators_are_checked_remotely() {
    let gate = SkipOn404::new(
        MockRemote::default().with("https://cdn.example.com/sprites/1.png"),
        SkipMethod::Process,
    );
    assert!(gate.exists("//cdn.example.com/sprites/1.png"));
    assert_eq!(
        gate.transform("//cdn.example.com/sprites/0.png"),
        Err(ProcessSignal::SkipField)
    );
}
