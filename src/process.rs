use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::error::MigrateError;
use crate::http::Fetcher;
use crate::value::is_empty;

/// Control signals raised by field-level process steps. Neither is a defect:
/// the caller decides whether to drop the row or just the field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessSignal {
    #[error("{0}")]
    SkipRow(String),
    #[error("skipped processing of the current field")]
    SkipField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipMethod {
    /// Drop the whole row.
    #[default]
    Row,
    /// Stop processing only the current field.
    Process,
}

impl fmt::Display for SkipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipMethod::Row => write!(f, "row"),
            SkipMethod::Process => write!(f, "process"),
        }
    }
}

impl FromStr for SkipMethod {
    type Err = MigrateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "row" => Ok(SkipMethod::Row),
            "process" => Ok(SkipMethod::Process),
            other => Err(MigrateError::InvalidSetting {
                name: "method".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Gate that lets a value through only when the file it points at exists,
/// either remotely (HEAD succeeds) or on the local filesystem.
pub struct SkipOn404<F: Fetcher> {
    fetcher: F,
    method: SkipMethod,
}

impl<F: Fetcher> SkipOn404<F> {
    pub fn new(fetcher: F, method: SkipMethod) -> Self {
        Self { fetcher, method }
    }

    pub fn method(&self) -> SkipMethod {
        self.method
    }

    pub fn transform<'a>(&self, value: &'a str) -> Result<&'a str, ProcessSignal> {
        if self.exists(value) {
            return Ok(value);
        }
        match self.method {
            SkipMethod::Row => Err(ProcessSignal::SkipRow(format!(
                "404 - {value} does not exist"
            ))),
            SkipMethod::Process => Err(ProcessSignal::SkipField),
        }
    }

    pub fn exists(&self, locator: &str) -> bool {
        if let Some(url) = remote_url(locator) {
            return match self.fetcher.head(url.as_str()) {
                Ok(()) => true,
                Err(err) => {
                    debug!(%err, locator, "remote file check failed");
                    false
                }
            };
        }
        local_path(locator).exists()
    }
}

/// Absolute URLs with a host are remote, as are protocol-relative `//host/..`
/// locators. `file://` URLs and everything else are local paths.
pub fn is_external(locator: &str) -> bool {
    remote_url(locator).is_some()
}

fn remote_url(locator: &str) -> Option<Url> {
    let url = match locator.strip_prefix("//") {
        Some(rest) => Url::parse(&format!("https://{rest}")).ok()?,
        None => Url::parse(locator).ok()?,
    };
    let remote = url.scheme() != "file" && url.host_str().is_some_and(|host| !host.is_empty());
    remote.then_some(url)
}

fn local_path(locator: &str) -> PathBuf {
    Url::parse(locator)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
        .unwrap_or_else(|| PathBuf::from(locator))
}

/// Returns the first non-empty candidate, or the first candidate when all of
/// them are empty.
pub fn use_first_value(candidates: &[Value]) -> Result<&Value, MigrateError> {
    candidates
        .iter()
        .find(|candidate| !is_empty(candidate))
        .or_else(|| candidates.first())
        .ok_or(MigrateError::OutOfRange { index: 0, len: 0 })
}
