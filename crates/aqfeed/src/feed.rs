//! Sensor feed sources.
//!
//! A [`FeedSource`] produces the raw JSON payload; [`parse_readings`] turns
//! it into typed readings. The live source talks to the AirQo API, the
//! snapshot source re-reads the last response written by `aqfeed update`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::reading::SensorReading;

/// Keys under which the API returns the list of records, in lookup order.
const RECORD_LIST_KEYS: &[&str] = &["measurements", "results"];

/// Something that can produce a sensor payload.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// The name of this source (for logging).
    fn name(&self) -> &'static str;

    /// Fetch the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be obtained or is not JSON.
    async fn fetch(&self) -> Result<Value>;
}

/// Live source: one GET against the cohort measurements endpoint.
#[derive(Debug, Clone)]
pub struct ApiSource {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl ApiSource {
    /// Create a source for `url`, authenticating with `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| Error::Network {
                url: url.clone(),
                source,
            })?;
        Ok(Self {
            client,
            url,
            token: token.into(),
        })
    }

    /// Create a source from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredential`] if the token or cohort id is not
    /// configured; no request is made in that case.
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config.token()?;
        let url = config.measurements_url()?;
        Self::new(url, token, config.timeout())
    }

    /// The endpoint this source requests.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedSource for ApiSource {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn fetch(&self) -> Result<Value> {
        debug!("GET {}", self.url);
        let network = |source| Error::Network {
            url: self.url.clone(),
            source,
        };

        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            warn!("Sensor API answered {} for {}", status, self.url);
            return Err(Error::HttpStatus {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(network)?;
        let payload = serde_json::from_slice(&body)?;
        info!("Fetched {} bytes from sensor API", body.len());
        Ok(payload)
    }
}

/// Offline source: the snapshot file written by the last update.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    path: PathBuf,
}

impl SnapshotSource {
    /// Create a source reading `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FeedSource for SnapshotSource {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn fetch(&self) -> Result<Value> {
        debug!("Reading snapshot {}", self.path.display());
        let body = tokio::fs::read(&self.path).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Extract readings from a payload.
///
/// Records are taken from `measurements`, else `results`. A missing or
/// non-list record field yields no readings and non-object records are
/// skipped.
///
/// # Errors
///
/// Returns [`Error::MalformedPayload`] if the payload is not a JSON object.
pub fn parse_readings(payload: &Value) -> Result<Vec<SensorReading>> {
    let Value::Object(body) = payload else {
        return Err(Error::malformed(format!(
            "expected a JSON object, got {}",
            kind(payload)
        )));
    };

    let records = RECORD_LIST_KEYS
        .iter()
        .filter_map(|key| body.get(*key))
        .find(|value| is_truthy(value));

    let Some(Value::Array(records)) = records else {
        debug!("Payload has no record list");
        return Ok(Vec::new());
    };

    let readings: Vec<SensorReading> = records
        .iter()
        .filter_map(Value::as_object)
        .map(SensorReading::from_record)
        .collect();

    if readings.len() < records.len() {
        debug!(
            "Skipped {} non-object records",
            records.len() - readings.len()
        );
    }
    Ok(readings)
}

/// `measurements: []` or `null` falls through to `results`.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::String(s) => !s.is_empty(),
        Value::Number(_) => true,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
