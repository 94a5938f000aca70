use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::redirect::Policy;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::MigrateError;
use crate::pagination::PaginationConfig;

const DEFAULT_TIMEOUT_SECS: f64 = 30.0;
const DEFAULT_MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Head,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Head => write!(f, "HEAD"),
        }
    }
}

impl FromStr for Method {
    type Err = MigrateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            _ => Err(MigrateError::InvalidSetting {
                name: "method".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// Per-call request description. `overlay` is deep-merged over the fetcher's
/// configured request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub overlay: Value,
}

/// Recursively merges `overlay` into `base`. Objects merge key by key at every
/// depth; any other overlay value replaces what was there.
pub fn merge_deep(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_deep(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Client-level knobs pulled out of a merged request-options document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportOptions {
    pub timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    /// `None` disables redirects.
    pub max_redirects: Option<usize>,
}

impl TransportOptions {
    pub fn defaults() -> Value {
        json!({
            "timeout": DEFAULT_TIMEOUT_SECS,
            "allow_redirects": { "max": DEFAULT_MAX_REDIRECTS },
        })
    }

    pub fn from_value(options: &Value) -> Result<Self, MigrateError> {
        let timeout = seconds(options, "timeout")?;
        let connect_timeout = seconds(options, "connect_timeout")?;
        let max_redirects = match options.get("allow_redirects") {
            None | Some(Value::Null) | Some(Value::Bool(true)) => Some(DEFAULT_MAX_REDIRECTS),
            Some(Value::Bool(false)) => None,
            Some(Value::Object(map)) => match map.get("max") {
                None => Some(DEFAULT_MAX_REDIRECTS),
                Some(max) => Some(max.as_u64().ok_or_else(|| invalid("allow_redirects.max", max))?
                    as usize),
            },
            Some(other) => return Err(invalid("allow_redirects", other)),
        };
        Ok(Self {
            timeout,
            connect_timeout,
            max_redirects,
        })
    }

    fn build_client(&self) -> Result<Client, MigrateError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("pokemon-migrate/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MigrateError::ConfigParse(err.to_string()))?,
        );
        let policy = match self.max_redirects {
            Some(max) => Policy::limited(max),
            None => Policy::none(),
        };
        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .redirect(policy);
        if let Some(connect_timeout) = self.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        builder
            .build()
            .map_err(|err| MigrateError::ConfigParse(err.to_string()))
    }
}

/// A zero timeout means "wait forever".
fn seconds(options: &Value, key: &str) -> Result<Option<Duration>, MigrateError> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let secs = value
                .as_f64()
                .filter(|secs| *secs >= 0.0)
                .ok_or_else(|| invalid(key, value))?;
            Ok((secs > 0.0).then(|| Duration::from_secs_f64(secs)))
        }
    }
}

fn invalid(name: &str, value: &Value) -> MigrateError {
    MigrateError::InvalidSetting {
        name: format!("request_options.{name}"),
        value: value.to_string(),
    }
}

/// The document-level operations the enrichment pipeline and the existence
/// gate need from an HTTP client.
pub trait Fetcher: Send + Sync {
    /// Plain GET of `url`, returning the body.
    fn get(&self, url: &str) -> Result<String, MigrateError>;
    /// HEAD of `url`; any transport failure or non-success status is an error.
    fn head(&self, url: &str) -> Result<(), MigrateError>;
}

impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    fn get(&self, url: &str) -> Result<String, MigrateError> {
        (**self).get(url)
    }

    fn head(&self, url: &str) -> Result<(), MigrateError> {
        (**self).head(url)
    }
}

/// Fetches paginated list endpoints with the configured method and the
/// resolved `limit`/`offset` query attached.
pub trait ListFetcher: Send + Sync {
    fn response_content(&self, url: &str) -> Result<String, MigrateError>;
}

impl<T: ListFetcher + ?Sized> ListFetcher for Arc<T> {
    fn response_content(&self, url: &str) -> Result<String, MigrateError> {
        (**self).response_content(url)
    }
}

pub struct HttpFetcher {
    client: Client,
    transport: TransportOptions,
    method: Method,
    headers: BTreeMap<String, String>,
    request_options: Value,
    url_parameters: Vec<(String, String)>,
}

impl HttpFetcher {
    pub fn new(source: &SourceConfig, pagination: &PaginationConfig) -> Result<Self, MigrateError> {
        let mut request_options = TransportOptions::defaults();
        merge_deep(&mut request_options, &source.request_options);
        let transport = TransportOptions::from_value(&request_options)?;
        let client = transport.build_client()?;
        Ok(Self {
            client,
            transport,
            method: source.method.parse()?,
            headers: source.headers.clone(),
            request_options,
            url_parameters: pagination.resolve(),
        })
    }

    pub fn url_parameters(&self) -> &[(String, String)] {
        &self.url_parameters
    }

    pub fn response(&self, url: &str, options: &RequestOptions) -> Result<Response, MigrateError> {
        let mut merged = self.request_options.clone();
        merge_deep(&mut merged, &options.overlay);
        let transport = TransportOptions::from_value(&merged)?;
        let client = if transport == self.transport {
            Cow::Borrowed(&self.client)
        } else {
            Cow::Owned(transport.build_client()?)
        };

        let mut request = client.request(options.method.as_reqwest(), url);
        for (name, value) in self.headers.iter().chain(options.headers.iter()) {
            request = request.header(name.as_str(), value.as_str());
        }
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }

        debug!(method = %options.method, url, "sending request");
        let response = request.send().map_err(|err| MigrateError::Network {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        handle_status(url, response)
    }
}

impl ListFetcher for HttpFetcher {
    fn response_content(&self, url: &str) -> Result<String, MigrateError> {
        let options = RequestOptions {
            method: self.method,
            query: self.url_parameters.clone(),
            ..RequestOptions::default()
        };
        let response = self.response(url, &options)?;
        read_body(url, response)
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &str) -> Result<String, MigrateError> {
        let response = self.response(url, &RequestOptions::default())?;
        read_body(url, response)
    }

    fn head(&self, url: &str) -> Result<(), MigrateError> {
        let options = RequestOptions {
            method: Method::Head,
            ..RequestOptions::default()
        };
        self.response(url, &options).map(|_| ())
    }
}

fn handle_status(url: &str, response: Response) -> Result<Response, MigrateError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    Err(MigrateError::Network {
        url: url.to_string(),
        message: format!("server returned status {status}"),
    })
}

fn read_body(url: &str, response: Response) -> Result<String, MigrateError> {
    let body = response.text().map_err(|err| MigrateError::Network {
        url: url.to_string(),
        message: err.to_string(),
    })?;
    if body.is_empty() {
        return Err(MigrateError::EmptyResponse {
            url: url.to_string(),
        });
    }
    Ok(body)
}
