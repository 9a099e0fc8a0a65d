//! Snapshot and archive files for aqfeed.
//!
//! Each update writes the raw API response to a JSON snapshot (which the
//! website can read directly) and appends readings it has not seen before
//! to a CSV archive. Rows are identified by `(datetime, device_name)`.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::reading::{format_number, SensorReading};

/// Archive columns, in file order.
pub const CSV_COLUMNS: [&str; 13] = [
    "datetime",
    "device_name",
    "frequency",
    "humidity",
    "latitude",
    "longitude",
    "network",
    "pm10",
    "pm10_calibrated_value",
    "pm2_5",
    "pm2_5_calibrated_value",
    "site_name",
    "temperature",
];

/// An archive key: `(datetime, device_name)`.
pub type ArchiveKey = (String, String);

/// Write the raw payload as pretty-printed JSON, creating parent
/// directories as needed.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_snapshot(path: impl AsRef<Path>, payload: &Value) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut body = serde_json::to_string_pretty(payload)?;
    body.push('\n');
    std::fs::write(path, body)?;
    debug!("Wrote snapshot {}", path.display());
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Append-only CSV archive of readings.
#[derive(Debug)]
pub struct CsvArchive {
    path: PathBuf,
}

impl CsvArchive {
    /// Open the archive at `path`, creating it with a header row if it
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its directory cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            ensure_parent(&path)?;
            let mut writer = csv_writer(File::create(&path)?);
            writer.write_record(CSV_COLUMNS)?;
            writer.flush()?;
            info!("Created archive {}", path.display());
        }
        Ok(Self { path })
    }

    /// Path of the archive file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys of every row already in the archive.
    ///
    /// Rows with a blank datetime or device are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read.
    pub fn existing_keys(&self) -> Result<HashSet<ArchiveKey>> {
        let mut keys = HashSet::new();
        for row in self.rows()? {
            if let Some(key) = row.key() {
                keys.insert(key);
            }
        }
        Ok(keys)
    }

    /// Append readings not yet archived.
    ///
    /// Readings without a full key, or whose key is already in the archive
    /// (or earlier in `readings`), are skipped. Returns the number of rows
    /// written.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read or written.
    pub fn append(&self, readings: &[SensorReading]) -> Result<usize> {
        let mut seen = self.existing_keys()?;

        let fresh: Vec<&SensorReading> = readings
            .iter()
            .filter(|reading| {
                reading
                    .archive_key()
                    .is_some_and(|key| seen.insert(key))
            })
            .collect();

        if fresh.is_empty() {
            debug!("No new rows for {}", self.path.display());
            return Ok(0);
        }

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = csv_writer(file);
        for reading in &fresh {
            writer.write_record(csv_record(reading))?;
        }
        writer.flush()?;

        info!(
            "Appended {} rows to {}",
            fresh.len(),
            self.path.display()
        );
        Ok(fresh.len())
    }

    /// Summarise the archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be read.
    pub fn stats(&self) -> Result<ArchiveStats> {
        let mut total_rows = 0;
        let mut devices = HashSet::new();
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;

        for row in self.rows()? {
            total_rows += 1;
            if !row.device_name.trim().is_empty() {
                devices.insert(row.device_name.trim().to_string());
            }
            if let Some(ts) = DateTime::parse_from_rfc3339(row.datetime.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
            {
                oldest = Some(oldest.map_or(ts, |o| o.min(ts)));
                newest = Some(newest.map_or(ts, |n| n.max(ts)));
            }
        }

        let file_size_bytes = std::fs::metadata(&self.path).map_or(0, |m| m.len());

        Ok(ArchiveStats {
            total_rows,
            devices: devices.len(),
            oldest,
            newest,
            file_size_bytes,
        })
    }

    fn rows(&self) -> Result<Vec<ArchiveRow>> {
        let file = File::open(&self.path)?;
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let mut rows = Vec::new();
        for row in reader.deserialize::<ArchiveRow>() {
            rows.push(row?);
        }
        Ok(rows)
    }
}

/// The columns of an archive row the archive itself needs to read back.
#[derive(Debug, serde::Deserialize)]
struct ArchiveRow {
    #[serde(default)]
    datetime: String,
    #[serde(default)]
    device_name: String,
}

impl ArchiveRow {
    fn key(&self) -> Option<ArchiveKey> {
        let datetime = self.datetime.trim();
        let device = self.device_name.trim();
        (!datetime.is_empty() && !device.is_empty())
            .then(|| (datetime.to_string(), device.to_string()))
    }
}

/// Rows end in CRLF, like the archives the site already publishes.
fn csv_writer<W: std::io::Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(inner)
}

/// One reading as an archive row, in [`CSV_COLUMNS`] order.
fn csv_record(reading: &SensorReading) -> [String; 13] {
    let num = |value: Option<f64>| value.map(format_number).unwrap_or_default();
    [
        reading.datetime.clone(),
        reading.device_name.clone(),
        reading.frequency.clone(),
        reading.humidity.clone(),
        reading.latitude.clone(),
        reading.longitude.clone(),
        reading.network.clone(),
        num(reading.pm10.raw),
        num(reading.pm10.calibrated),
        num(reading.pm2_5.raw),
        num(reading.pm2_5.calibrated),
        reading.site_name.clone(),
        reading.temperature.clone(),
    ]
}

/// Statistics about the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    /// Number of data rows.
    pub total_rows: usize,
    /// Number of distinct devices.
    pub devices: usize,
    /// Earliest parseable reading time.
    pub oldest: Option<DateTime<Utc>>,
    /// Latest parseable reading time.
    pub newest: Option<DateTime<Utc>>,
    /// Size of the archive file in bytes.
    pub file_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Pollutant;
    use serde_json::json;

    fn reading(datetime: &str, device: &str, pm2_5: f64) -> SensorReading {
        SensorReading {
            datetime: datetime.to_string(),
            device_name: device.to_string(),
            site_name: "Makerere".to_string(),
            pm2_5: Pollutant {
                raw: Some(pm2_5),
                calibrated: Some(pm2_5),
            },
            ..SensorReading::default()
        }
    }

    #[test]
    fn test_open_creates_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/archive.csv");

        let archive = CsvArchive::open(&path).unwrap();
        assert_eq!(archive.path(), path.as_path());

        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body, format!("{}\r\n", CSV_COLUMNS.join(",")));
    }

    #[test]
    fn test_open_existing_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.csv");
        std::fs::write(&path, "datetime,device_name\nx,y\n").unwrap();

        CsvArchive::open(&path).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body, "datetime,device_name\nx,y\n");
    }

    #[test]
    fn test_append_writes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let archive = CsvArchive::open(dir.path().join("a.csv")).unwrap();

        let appended = archive
            .append(&[reading("2024-03-01T10:00:00+00:00", "dev-1", 12.5)])
            .unwrap();
        assert_eq!(appended, 1);

        let body = std::fs::read_to_string(archive.path()).unwrap();
        assert!(body.ends_with(",Makerere,\r\n"));
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "2024-03-01T10:00:00+00:00,dev-1,,,,,,,,12.5,12.5,Makerere,"
        );
    }

    #[test]
    fn test_append_deduplicates_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let archive = CsvArchive::open(dir.path().join("a.csv")).unwrap();
        let batch = [
            reading("2024-03-01T10:00:00+00:00", "dev-1", 1.0),
            reading("2024-03-01T10:00:00+00:00", "dev-2", 2.0),
        ];

        assert_eq!(archive.append(&batch).unwrap(), 2);
        assert_eq!(archive.append(&batch).unwrap(), 0);
        assert_eq!(archive.existing_keys().unwrap().len(), 2);
    }

    #[test]
    fn test_append_deduplicates_within_batch() {
        let dir = tempfile::tempdir().unwrap();
        let archive = CsvArchive::open(dir.path().join("a.csv")).unwrap();
        let batch = [
            reading("2024-03-01T10:00:00+00:00", "dev-1", 1.0),
            reading("2024-03-01T10:00:00+00:00", " dev-1 ", 9.0),
        ];

        assert_eq!(archive.append(&batch).unwrap(), 1);
    }

    #[test]
    fn test_append_skips_incomplete_keys() {
        let dir = tempfile::tempdir().unwrap();
        let archive = CsvArchive::open(dir.path().join("a.csv")).unwrap();
        let batch = [
            reading("", "dev-1", 1.0),
            reading("2024-03-01T10:00:00+00:00", "  ", 1.0),
        ];

        assert_eq!(archive.append(&batch).unwrap(), 0);
    }

    #[test]
    fn test_existing_keys_reads_foreign_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(
            &path,
            format!(
                "{}\n2024-01-01T00:00:00+00:00,old-dev,,,,,,,,,,,\n,orphan,,,,,,,,,,,\n",
                CSV_COLUMNS.join(",")
            ),
        )
        .unwrap();

        let archive = CsvArchive::open(&path).unwrap();
        let keys = archive.existing_keys().unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&(
            "2024-01-01T00:00:00+00:00".to_string(),
            "old-dev".to_string()
        )));

        let appended = archive
            .append(&[reading("2024-01-01T00:00:00+00:00", "old-dev", 3.0)])
            .unwrap();
        assert_eq!(appended, 0);
    }

    #[test]
    fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let archive = CsvArchive::open(dir.path().join("a.csv")).unwrap();
        archive
            .append(&[
                reading("2024-03-01T10:00:00+00:00", "dev-1", 1.0),
                reading("2024-03-01T11:00:00+00:00", "dev-1", 1.0),
                reading("2024-02-28T09:00:00+00:00", "dev-2", 1.0),
            ])
            .unwrap();

        let stats = archive.stats().unwrap();
        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.devices, 2);
        assert_eq!(
            stats.oldest.unwrap().to_rfc3339(),
            "2024-02-28T09:00:00+00:00"
        );
        assert_eq!(
            stats.newest.unwrap().to_rfc3339(),
            "2024-03-01T11:00:00+00:00"
        );
        assert!(stats.file_size_bytes > 0);
    }

    #[test]
    fn test_stats_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = CsvArchive::open(dir.path().join("a.csv")).unwrap();

        let stats = archive.stats().unwrap();
        assert_eq!(stats.total_rows, 0);
        assert!(stats.oldest.is_none());
    }

    #[test]
    fn test_write_snapshot_pretty_and_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/recent.json");
        let payload = json!({"site": "Mbárara", "measurements": []});

        write_snapshot(&path, &payload).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("Mbárara"));
        assert!(body.contains("\n  \"site\""));
        let round: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(round, payload);
    }
}
