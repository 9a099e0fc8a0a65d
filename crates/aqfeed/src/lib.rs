//! `aqfeed` - Live air-quality data for a static research-group website
//!
//! This library fetches readings from the AirQo sensor API, turns them into
//! typed [`SensorReading`]s, renders the air-quality widget (falling back to
//! a static message when live data is unavailable), and keeps a JSON
//! snapshot plus a de-duplicated CSV archive of what it has seen.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod reading;
pub mod update;
pub mod widget;

pub use archive::{ArchiveStats, CsvArchive};
pub use config::Config;
pub use error::{Error, Result};
pub use feed::{parse_readings, ApiSource, FeedSource, SnapshotSource};
pub use logging::init_logging;
pub use reading::{Pollutant, SensorReading};
pub use update::{run_update, UpdateReport};
pub use widget::{Widget, WidgetView};
