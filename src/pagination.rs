use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// A pagination value as it appears in settings: either a JSON number or a
/// numeric string written by hand.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(u64),
    Text(String),
}

impl ParamValue {
    /// Zero, `"0"`, and blank text all mean "leave the parameter off".
    pub fn is_unset(&self) -> bool {
        match self {
            ParamValue::Number(value) => *value == 0,
            ParamValue::Text(text) => {
                let trimmed = text.trim();
                trimmed.is_empty() || trimmed.parse::<u64>().map(|v| v == 0).unwrap_or(false)
            }
        }
    }

    pub fn parse_setting(name: &str, raw: &str) -> Result<Self, MigrateError> {
        raw.trim()
            .parse::<u64>()
            .map(ParamValue::Number)
            .map_err(|_| MigrateError::InvalidSetting {
                name: name.to_string(),
                value: raw.to_string(),
            })
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(value) => write!(f, "{value}"),
            ParamValue::Text(text) => write!(f, "{}", text.trim()),
        }
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::Number(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationConfig {
    pub limit: Option<ParamValue>,
    pub offset: Option<ParamValue>,
}

impl PaginationConfig {
    pub fn new(limit: Option<ParamValue>, offset: Option<ParamValue>) -> Self {
        Self { limit, offset }
    }

    /// Query parameters for list endpoints, in `limit`, `offset` order.
    pub fn resolve(&self) -> Vec<(String, String)> {
        [("limit", &self.limit), ("offset", &self.offset)]
            .into_iter()
            .filter_map(|(name, value)| {
                value
                    .as_ref()
                    .filter(|value| !value.is_unset())
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect()
    }
}
