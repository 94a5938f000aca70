use std::io::{self, Write};

use serde::Serialize;

use crate::config::Settings;
use crate::migrate::{ProgressEvent, ProgressSink, RunReport};

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub locator: String,
    pub external: bool,
    pub exists: bool,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_settings(settings: &Settings) -> io::Result<()> {
        Self::print_json(settings)
    }

    pub fn print_check(result: &CheckResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}
