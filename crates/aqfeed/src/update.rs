//! The archive update run.
//!
//! One fetch, then the snapshot is overwritten and new readings are appended
//! to the archive. Unlike the widget, any failure here is reported to the
//! caller: a scheduled update should fail loudly.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::archive::{write_snapshot, CsvArchive};
use crate::error::Result;
use crate::feed::{parse_readings, FeedSource};

/// What an update wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// Snapshot file that was written.
    pub snapshot_path: PathBuf,
    /// Archive file that was appended to.
    pub archive_path: PathBuf,
    /// Readings found in the payload.
    pub readings: usize,
    /// Rows appended to the archive.
    pub appended: usize,
}

/// Fetch from `source`, write the snapshot and append to the archive.
///
/// # Errors
///
/// Returns an error if the fetch fails, the payload is not an object, or
/// either file cannot be written.
pub async fn run_update(
    source: &dyn FeedSource,
    snapshot_path: &Path,
    archive_path: &Path,
) -> Result<UpdateReport> {
    let payload = source.fetch().await?;
    write_snapshot(snapshot_path, &payload)?;

    let readings = parse_readings(&payload)?;
    let archive = CsvArchive::open(archive_path)?;
    let appended = archive.append(&readings)?;

    info!(
        "Update from {}: {} readings, {} new",
        source.name(),
        readings.len(),
        appended
    );

    Ok(UpdateReport {
        snapshot_path: snapshot_path.to_path_buf(),
        archive_path: archive_path.to_path_buf(),
        readings: readings.len(),
        appended,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::feed::SnapshotSource;
    use crate::logging::init_test_logging;

    #[tokio::test]
    async fn test_update_from_snapshot_file() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.json");
        std::fs::write(
            &input,
            r#"{"measurements": [
                {"device": "a", "time": "2024-03-01T10:00:00Z", "pm2_5": {"value": 10}},
                {"device": "b", "time": "2024-03-01T10:00:00Z", "pm2_5": {"value": 20}},
                {"time": "2024-03-01T10:00:00Z"}
            ]}"#,
        )
        .unwrap();
        let snapshot = dir.path().join("data/recent.json");
        let archive = dir.path().join("data/archive.csv");
        let source = SnapshotSource::new(&input);

        let report = run_update(&source, &snapshot, &archive).await.unwrap();
        assert_eq!(report.readings, 3);
        assert_eq!(report.appended, 2);
        assert!(snapshot.exists());

        let again = run_update(&source, &snapshot, &archive).await.unwrap();
        assert_eq!(again.appended, 0);
    }

    #[tokio::test]
    async fn test_update_non_object_payload_writes_snapshot_then_fails() {
        init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input.json");
        std::fs::write(&input, "[1, 2]").unwrap();
        let snapshot = dir.path().join("data/recent.json");
        let archive = dir.path().join("data/archive.csv");

        let err = run_update(&SnapshotSource::new(&input), &snapshot, &archive)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
        assert!(snapshot.exists());
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn test_update_fails_on_fetch_error() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("recent.json");
        let source = SnapshotSource::new(dir.path().join("missing.json"));

        let err = run_update(&source, &snapshot, &dir.path().join("a.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(!snapshot.exists());
    }
}
