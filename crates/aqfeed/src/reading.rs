//! Sensor reading types for aqfeed.
//!
//! The sensor API is loose about field names and value shapes, so a reading
//! is built by probing a list of candidate keys per field and normalising
//! whatever is found into text the website (and the CSV archive) can use
//! as-is.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const DATETIME_KEYS: &[&str] = &["time", "timestamp", "created_at", "createdAt"];
const DEVICE_KEYS: &[&str] = &["device", "device_id", "deviceId", "name"];
const SITE_KEYS: &[&str] = &["site_name", "siteName", "site"];
const HUMIDITY_KEYS: &[&str] = &["humidity", "rh"];
const TEMPERATURE_KEYS: &[&str] = &["temperature", "temp"];
const LATITUDE_KEYS: &[&str] = &["latitude", "lat"];
const LONGITUDE_KEYS: &[&str] = &["longitude", "lon", "lng"];
const PM2_5_KEYS: &[&str] = &["pm2_5", "pm25", "pm_2_5"];
const PM10_KEYS: &[&str] = &["pm10", "pm_10"];

const RAW_KEYS: &[&str] = &["value", "rawValue", "raw_value", "raw"];
const CALIBRATED_KEYS: &[&str] = &[
    "calibratedValue",
    "calibrated_value",
    "calibrated",
    "calibratedValueUg",
    "calibratedValueUG",
];

/// A particulate-matter measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pollutant {
    /// Value as reported by the sensor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<f64>,
    /// Calibrated value; falls back to `raw` when the API sends none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calibrated: Option<f64>,
}

impl Pollutant {
    /// Extract a pollutant from either `{ value, calibratedValue }` style
    /// objects or a bare number.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(obj) => {
                let raw = pick(obj, RAW_KEYS).and_then(number);
                let calibrated = pick(obj, CALIBRATED_KEYS).and_then(number).or(raw);
                Self { raw, calibrated }
            }
            other => {
                let raw = number(other);
                Self {
                    raw,
                    calibrated: raw,
                }
            }
        }
    }

    /// The most trustworthy value available.
    #[must_use]
    pub fn best(&self) -> Option<f64> {
        self.calibrated.or(self.raw)
    }

    /// Whether neither value was present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.is_none() && self.calibrated.is_none()
    }
}

/// One air-quality reading from one device.
///
/// Text fields are empty when the API did not send them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Measurement time, normalised to ISO-8601 UTC where possible.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub datetime: String,
    /// Device identifier.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub device_name: String,
    /// Human-readable site name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub site_name: String,
    /// Sensor network the device belongs to.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub network: String,
    /// Reporting frequency (e.g. `hourly`).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub frequency: String,
    /// Relative humidity.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub humidity: String,
    /// Temperature.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub temperature: String,
    /// Latitude.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub latitude: String,
    /// Longitude.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub longitude: String,
    /// PM2.5 concentration.
    #[serde(skip_serializing_if = "Pollutant::is_empty")]
    pub pm2_5: Pollutant,
    /// PM10 concentration.
    #[serde(skip_serializing_if = "Pollutant::is_empty")]
    pub pm10: Pollutant,
}

impl SensorReading {
    /// Build a reading from one record of the API response.
    #[must_use]
    pub fn from_record(record: &Map<String, Value>) -> Self {
        let field = |keys: &[&str]| pick(record, keys).map(text).unwrap_or_default();
        let pollutant =
            |keys: &[&str]| pick(record, keys).map(Pollutant::from_value).unwrap_or_default();

        Self {
            datetime: pick(record, DATETIME_KEYS)
                .map(normalize_timestamp)
                .unwrap_or_default(),
            device_name: field(DEVICE_KEYS),
            site_name: field(SITE_KEYS),
            network: field(&["network"]),
            frequency: field(&["frequency"]),
            humidity: field(HUMIDITY_KEYS),
            temperature: field(TEMPERATURE_KEYS),
            latitude: field(LATITUDE_KEYS),
            longitude: field(LONGITUDE_KEYS),
            pm2_5: pollutant(PM2_5_KEYS),
            pm10: pollutant(PM10_KEYS),
        }
    }

    /// The measurement time, if `datetime` holds a valid timestamp.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.datetime)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// The `(datetime, device_name)` pair identifying this reading in the
    /// archive, or `None` if either part is blank.
    #[must_use]
    pub fn archive_key(&self) -> Option<(String, String)> {
        let datetime = self.datetime.trim();
        let device = self.device_name.trim();
        if datetime.is_empty() || device.is_empty() {
            None
        } else {
            Some((datetime.to_string(), device.to_string()))
        }
    }

    /// Name to show for this reading: the site if known, else the device.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.site_name.trim().is_empty() {
            &self.device_name
        } else {
            &self.site_name
        }
    }
}

/// First value whose key is present, even if that value is `null`.
fn pick<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| record.get(*key))
}

/// Interpret a JSON value as a finite number.
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

/// Render a JSON value as archive text.
fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) if n.is_f64() => n.as_f64().map(format_number).unwrap_or_default(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Format a float with at most four decimals and no trailing zeros.
///
/// ```
/// assert_eq!(aqfeed::reading::format_number(12.30000), "12.3");
/// assert_eq!(aqfeed::reading::format_number(7.0), "7");
/// assert_eq!(aqfeed::reading::format_number(0.123456), "0.1235");
/// ```
#[must_use]
pub fn format_number(value: f64) -> String {
    let fixed = format!("{value:.4}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Normalise a timestamp as sent by the API.
///
/// Numbers are epoch milliseconds. Strings are parsed as ISO-8601 (naive
/// values are taken as UTC) and re-rendered in UTC; strings that do not
/// parse are kept verbatim. Zero, empty and `null` give an empty string.
#[must_use]
pub fn normalize_timestamp(value: &Value) -> String {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|ms| *ms != 0.0)
            .and_then(from_epoch_millis)
            .map(iso)
            .unwrap_or_default(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                String::new()
            } else {
                parse_iso(s).map_or_else(|| s.to_string(), iso)
            }
        }
        Value::Null | Value::Bool(_) => String::new(),
        other => other.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch_millis(ms: f64) -> Option<DateTime<Utc>> {
    if !ms.is_finite() {
        return None;
    }
    DateTime::from_timestamp_micros((ms * 1000.0).round() as i64)
}

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%d %H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M%z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    // A trailing `Z` on an otherwise naive time is UTC.
    let naive_text = s.strip_suffix('Z').unwrap_or(s);
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// ISO-8601 with an explicit `+00:00` offset and microseconds only when
/// non-zero, the same text earlier archive rows were written with.
fn iso(dt: DateTime<Utc>) -> String {
    if dt.nanosecond() == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
    }
}
