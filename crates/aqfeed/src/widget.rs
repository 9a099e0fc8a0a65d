//! The live air-quality widget.
//!
//! Loading the widget is a single linear operation: fetch the payload, parse
//! it, keep what can be displayed. Any failure along the way turns into a
//! fallback view carrying the configured static message, so callers always
//! get something to render and the rest of the page is never affected.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::WidgetConfig;
use crate::error::{Error, Result};
use crate::feed::{parse_readings, FeedSource};
use crate::reading::{format_number, SensorReading};

/// Marker opening the widget region of a page.
pub const START_MARKER: &str = "<!-- air-quality:start -->";

/// Marker closing the widget region of a page.
pub const END_MARKER: &str = "<!-- air-quality:end -->";

/// Why the widget is showing its fallback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The API could not be reached, or the snapshot could not be read.
    Unreachable,
    /// The API answered with a non-success status.
    HttpStatus,
    /// The payload was not usable JSON.
    MalformedPayload,
    /// The payload held nothing displayable.
    NoReadings,
    /// Credentials for the API are not configured.
    NotConfigured,
    /// Something other than the feed failed.
    Internal,
}

impl FallbackReason {
    /// Classify a fetch or parse error.
    ///
    /// Errors that are not [fetch failures](Error::is_fetch_failure) map to
    /// [`FallbackReason::Internal`].
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        if !err.is_fetch_failure() {
            return Self::Internal;
        }
        match err {
            Error::Network { .. } | Error::Io(_) => Self::Unreachable,
            Error::HttpStatus { .. } => Self::HttpStatus,
            Error::Json(_) | Error::MalformedPayload { .. } => Self::MalformedPayload,
            Error::MissingCredential { .. } => Self::NotConfigured,
            Error::ConfigLoad(_)
            | Error::ConfigValidation { .. }
            | Error::Csv(_)
            | Error::DirectoryCreate { .. }
            | Error::PageMarkers { .. } => Self::Internal,
        }
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable => write!(f, "unreachable"),
            Self::HttpStatus => write!(f, "http_status"),
            Self::MalformedPayload => write!(f, "malformed_payload"),
            Self::NoReadings => write!(f, "no_readings"),
            Self::NotConfigured => write!(f, "not_configured"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// What the widget displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WidgetView {
    /// Live readings, newest first.
    Readings {
        /// Widget heading.
        title: String,
        /// Readings to display.
        readings: Vec<SensorReading>,
    },
    /// Static fallback.
    Fallback {
        /// Widget heading.
        title: String,
        /// Failure classification.
        reason: FallbackReason,
        /// Underlying error text, for logs and tooling only.
        detail: String,
        /// Message shown to visitors.
        message: String,
    },
}

/// Builds [`WidgetView`]s.
#[derive(Debug, Clone)]
pub struct Widget {
    title: String,
    fallback_message: String,
    max_readings: usize,
}

impl Widget {
    /// Create a widget from its configuration.
    #[must_use]
    pub fn new(config: &WidgetConfig) -> Self {
        Self {
            title: config.title.clone(),
            fallback_message: config.fallback_message.clone(),
            max_readings: config.max_readings,
        }
    }

    /// Fetch from `source` and build the view. Never fails.
    pub async fn load(&self, source: &dyn FeedSource) -> WidgetView {
        debug!("Loading widget from {} source", source.name());
        match source.fetch().await {
            Ok(payload) => self.view_from_payload(&payload),
            Err(err) => self.view_for_error(&err),
        }
    }

    /// Build the view for an already fetched payload.
    #[must_use]
    pub fn view_from_payload(&self, payload: &Value) -> WidgetView {
        match parse_readings(payload) {
            Ok(readings) => self.view_from_readings(readings),
            Err(err) => self.view_for_error(&err),
        }
    }

    /// Build the view for parsed readings.
    #[must_use]
    pub fn view_from_readings(&self, readings: Vec<SensorReading>) -> WidgetView {
        let total = readings.len();
        let readings = latest_per_device(readings, self.max_readings);
        if readings.is_empty() {
            warn!("None of {} records had displayable values", total);
            return self.fallback(
                FallbackReason::NoReadings,
                format!("{total} records, none displayable"),
            );
        }

        info!("Widget shows {} of {} readings", readings.len(), total);
        WidgetView::Readings {
            title: self.title.clone(),
            readings,
        }
    }

    /// The fallback view for a failed fetch or parse.
    #[must_use]
    pub fn view_for_error(&self, err: &Error) -> WidgetView {
        if err.is_fetch_failure() {
            warn!("Showing fallback: {}", err);
        } else {
            error!("Showing fallback after unexpected error: {}", err);
        }
        self.fallback(FallbackReason::from_error(err), err.to_string())
    }

    fn fallback(&self, reason: FallbackReason, detail: String) -> WidgetView {
        WidgetView::Fallback {
            title: self.title.clone(),
            reason,
            detail,
            message: self.fallback_message.clone(),
        }
    }
}

/// Keep displayable readings, the newest per device, newest first,
/// at most `max` of them.
///
/// Readings are grouped by device name, or by site when the device is
/// unnamed. Readings without a timestamp sort last.
#[must_use]
pub fn latest_per_device(mut readings: Vec<SensorReading>, max: usize) -> Vec<SensorReading> {
    readings.retain(has_measurements);
    readings.sort_by_key(|r| Reverse(r.timestamp()));

    let mut seen = HashSet::new();
    readings
        .into_iter()
        .filter(|r| {
            let key = match r.device_name.trim() {
                "" => r.label().trim(),
                device => device,
            };
            key.is_empty() || seen.insert(key.to_string())
        })
        .take(max)
        .collect()
}

fn has_measurements(reading: &SensorReading) -> bool {
    !measurements(reading).is_empty()
}

/// A labelled value ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Measurement {
    class: &'static str,
    label: &'static str,
    value: String,
    unit: &'static str,
}

/// Only the measurements actually present in the reading.
fn measurements(reading: &SensorReading) -> Vec<Measurement> {
    let mut out = Vec::new();
    let mut push = |class, label, value: String, unit| {
        if !value.trim().is_empty() {
            out.push(Measurement {
                class,
                label,
                value: value.trim().to_string(),
                unit,
            });
        }
    };

    push(
        "aq-pm2_5",
        "PM2.5",
        reading.pm2_5.best().map(format_number).unwrap_or_default(),
        "µg/m³",
    );
    push(
        "aq-pm10",
        "PM10",
        reading.pm10.best().map(format_number).unwrap_or_default(),
        "µg/m³",
    );
    push(
        "aq-temperature",
        "Temperature",
        reading.temperature.clone(),
        "°C",
    );
    push("aq-humidity", "Humidity", reading.humidity.clone(), "%");
    out
}

/// Reading time for display: parsed times in UTC, anything else verbatim.
fn display_time(reading: &SensorReading) -> Option<String> {
    if reading.datetime.trim().is_empty() {
        return None;
    }
    Some(reading.timestamp().map_or_else(
        || reading.datetime.trim().to_string(),
        |ts| ts.format("%Y-%m-%d %H:%M UTC").to_string(),
    ))
}

impl WidgetView {
    /// Whether this is the fallback view.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    /// Render as an HTML fragment for the widget region of a page.
    #[must_use]
    pub fn render_html(&self) -> String {
        let mut html = String::from("<section id=\"air-quality\" class=\"aq-widget\">\n");
        match self {
            Self::Readings { title, readings } => {
                html.push_str(&format!("  <h2>{}</h2>\n", escape_html(title)));
                html.push_str("  <ul class=\"aq-readings\">\n");
                for reading in readings {
                    html.push_str(&reading_html(reading));
                }
                html.push_str("  </ul>\n");
            }
            Self::Fallback { title, message, .. } => {
                html.push_str(&format!("  <h2>{}</h2>\n", escape_html(title)));
                html.push_str(&format!(
                    "  <p class=\"aq-fallback\">{}</p>\n",
                    escape_html(message)
                ));
            }
        }
        html.push_str("</section>\n");
        html
    }

    /// Render as plain text.
    #[must_use]
    pub fn render_plain(&self) -> String {
        match self {
            Self::Readings { title, readings } => {
                let mut text = format!("{title}\n");
                for reading in readings {
                    let values: Vec<String> = measurements(reading)
                        .iter()
                        .map(|m| format!("{} {} {}", m.label, m.value, m.unit))
                        .collect();
                    text.push_str(&format!("{}: {}", reading.label(), values.join(", ")));
                    if let Some(time) = display_time(reading) {
                        text.push_str(&format!(" ({time})"));
                    }
                    text.push('\n');
                }
                text
            }
            Self::Fallback { title, message, .. } => format!("{title}\n{message}\n"),
        }
    }

    /// Render as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn reading_html(reading: &SensorReading) -> String {
    let mut html = String::new();
    if reading.device_name.trim().is_empty() {
        html.push_str("    <li class=\"aq-reading\">\n");
    } else {
        html.push_str(&format!(
            "    <li class=\"aq-reading\" data-device=\"{}\">\n",
            escape_html(reading.device_name.trim())
        ));
    }
    if !reading.label().trim().is_empty() {
        html.push_str(&format!(
            "      <span class=\"aq-site\">{}</span>\n",
            escape_html(reading.label().trim())
        ));
    }
    for m in measurements(reading) {
        html.push_str(&format!(
            "      <span class=\"{}\">{}: {} {}</span>\n",
            m.class,
            m.label,
            escape_html(&m.value),
            m.unit
        ));
    }
    if let Some(time) = display_time(reading) {
        html.push_str(&format!(
            "      <time class=\"aq-time\" datetime=\"{}\">{}</time>\n",
            escape_html(reading.datetime.trim()),
            escape_html(&time)
        ));
    }
    html.push_str("    </li>\n");
    html
}

/// Escape text for HTML element content and attribute values.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Replace the widget region of `page` with `fragment`.
///
/// Everything outside the markers is returned unchanged.
///
/// # Errors
///
/// Returns a description of the problem if the markers are missing or out
/// of order.
pub fn inject_into_page(page: &str, fragment: &str) -> std::result::Result<String, String> {
    let start = page
        .find(START_MARKER)
        .ok_or_else(|| format!("missing start marker {START_MARKER}"))?;
    let body_start = start + START_MARKER.len();
    let end = page[body_start..]
        .find(END_MARKER)
        .map(|offset| body_start + offset)
        .ok_or_else(|| format!("missing end marker {END_MARKER} after start marker"))?;

    let mut out = String::with_capacity(page.len() + fragment.len());
    out.push_str(&page[..body_start]);
    out.push('\n');
    out.push_str(fragment.trim_end());
    out.push('\n');
    out.push_str(&page[end..]);
    Ok(out)
}

/// Inject `fragment` into the page file at `path`.
///
/// The file is left untouched if its markers are unusable or the content
/// would not change. Returns whether the file was rewritten.
///
/// # Errors
///
/// Returns [`Error::PageMarkers`] for unusable markers, or an I/O error.
pub fn publish_to_page(path: impl AsRef<Path>, fragment: &str) -> Result<bool> {
    let path = path.as_ref();
    let page = std::fs::read_to_string(path)?;
    let updated =
        inject_into_page(&page, fragment).map_err(|message| Error::page_markers(path, message))?;

    if updated == page {
        debug!("Page {} already up to date", path.display());
        return Ok(false);
    }

    std::fs::write(path, updated)?;
    info!("Updated widget region of {}", path.display());
    Ok(true)
}
