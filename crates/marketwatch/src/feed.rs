//! Snapshot input from the capture pipeline.
//!
//! The pipeline that reads the marketplace lives outside this repository.
//! All it has to do is hand over, once per scan cycle, the set of
//! (seller, item) pairs it saw. A single blank identifier rejects the whole
//! snapshot; nothing from a malformed batch is applied.

use async_trait::async_trait;
use marketwatch_db::Combination;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::error::{MonitorError, Result};

/// The deduplicated set of combinations observed in one scan cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    combinations: BTreeSet<Combination>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot from raw pairs, rejecting it entirely if any pair is
    /// blank. Duplicates collapse.
    pub fn from_pairs<I, S, T>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut combinations = BTreeSet::new();
        for (index, (seller, item)) in pairs.into_iter().enumerate() {
            let combination = Combination::new(seller, item)
                .map_err(|e| MonitorError::validation(format!("entry {}: {}", index, e)))?;
            combinations.insert(combination);
        }
        Ok(Self { combinations })
    }

    pub fn combinations(&self) -> &BTreeSet<Combination> {
        &self.combinations
    }

    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }
}

impl From<BTreeSet<Combination>> for Snapshot {
    fn from(combinations: BTreeSet<Combination>) -> Self {
        Self { combinations }
    }
}

/// Source of one snapshot per scan cycle.
#[async_trait]
pub trait SnapshotFeed: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Fetch the snapshot for the current cycle
    async fn next_snapshot(&self) -> Result<Snapshot>;

    /// The last snapshot returned (or rejected) has been dealt with and must
    /// not be served again.
    fn acknowledge(&self) {}
}

/// Wire shape written by the capture pipeline.
///
/// Fields are optional so a `null` is reported as a validation failure
/// instead of a JSON syntax error.
#[derive(Debug, Deserialize)]
struct ListingWire {
    seller: Option<String>,
    item: Option<String>,
}

/// Parse a JSON array of `{"seller": .., "item": ..}` objects.
pub fn parse_snapshot_json(content: &str) -> Result<Snapshot> {
    let listings: Vec<ListingWire> = serde_json::from_str(content)
        .map_err(|e| MonitorError::validation(format!("malformed snapshot JSON: {}", e)))?;

    Snapshot::from_pairs(listings.into_iter().map(|wire| {
        (
            wire.seller.unwrap_or_default(),
            wire.item.unwrap_or_default(),
        )
    }))
}

/// Identifies one version of the snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileVersion {
    modified: SystemTime,
    len: u64,
}

#[derive(Debug, Default)]
struct FeedCursor {
    /// Version handed out by the last `next_snapshot`
    served: Option<FileVersion>,
    /// Version last acknowledged by the scheduler
    consumed: Option<FileVersion>,
}

/// Reads the snapshot file the capture pipeline drops each cycle.
///
/// A file version is served until it is acknowledged. After that the feed
/// reports a retryable error until the pipeline rewrites the file, so a
/// stalled capture never replays an old snapshot as a fresh scan.
pub struct JsonFileFeed {
    path: PathBuf,
    name: String,
    cursor: Mutex<FeedCursor>,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("json:{}", path.display());
        Self {
            path,
            name,
            cursor: Mutex::new(FeedCursor::default()),
        }
    }

    fn cursor(&self) -> std::sync::MutexGuard<'_, FeedCursor> {
        // The cursor holds plain values, so a poisoned lock is still usable
        self.cursor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SnapshotFeed for JsonFileFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_snapshot(&self) -> Result<Snapshot> {
        let read_err =
            |e: std::io::Error| MonitorError::feed(format!("{}: {}", self.path.display(), e));

        let metadata = tokio::fs::metadata(&self.path).await.map_err(read_err)?;
        let version = FileVersion {
            modified: metadata.modified().map_err(read_err)?,
            len: metadata.len(),
        };

        if self.cursor().consumed == Some(version) {
            return Err(MonitorError::feed(format!(
                "{}: snapshot not rewritten since last scan",
                self.path.display()
            )));
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(read_err)?;
        self.cursor().served = Some(version);
        parse_snapshot_json(&content)
    }

    fn acknowledge(&self) {
        let mut cursor = self.cursor();
        cursor.consumed = cursor.served.take();
    }
}

/// Serves the same snapshot every cycle.
pub struct StaticFeed {
    snapshot: Snapshot,
}

impl StaticFeed {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl SnapshotFeed for StaticFeed {
    fn name(&self) -> &str {
        "static"
    }

    async fn next_snapshot(&self) -> Result<Snapshot> {
        Ok(self.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_pairs_deduplicates() {
        let snapshot =
            Snapshot::from_pairs([("S1", "I1"), ("S1", "I1"), ("S2", "I1")]).unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_blank_identifier_rejects_whole_snapshot() {
        let err = Snapshot::from_pairs([("S1", "I1"), ("", "I2"), ("S3", "I3")]).unwrap_err();
        match err {
            MonitorError::Validation(msg) => assert!(msg.contains("entry 1")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_json_rejects_null() {
        let err = parse_snapshot_json(r#"[{"seller": "S1", "item": null}]"#).unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));

        let err = parse_snapshot_json(r#"{"seller": "S1"}"#).unwrap_err();
        assert!(matches!(err, MonitorError::Validation(_)));
    }

    #[test]
    fn test_parse_json() {
        let snapshot = parse_snapshot_json(
            r#"[{"seller": "S1", "item": "I1"}, {"seller": "S2", "item": "I2"}]"#,
        )
        .unwrap();
        assert!(snapshot
            .combinations()
            .contains(&Combination::new("S2", "I2").unwrap()));
    }

    #[tokio::test]
    async fn test_json_file_feed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        let feed = JsonFileFeed::new(&path);

        let err = feed.next_snapshot().await.unwrap_err();
        assert!(matches!(err, MonitorError::Feed(_)));

        std::fs::write(&path, r#"[{"seller": "S1", "item": "I1"}]"#).unwrap();
        assert_eq!(feed.next_snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_feed_waits_for_rewrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("snapshot.json");
        std::fs::write(&path, r#"[{"seller": "S1", "item": "I1"}]"#).unwrap();
        let feed = JsonFileFeed::new(&path);

        // Not acknowledged yet, so the same version is served again
        feed.next_snapshot().await.unwrap();
        assert_eq!(feed.next_snapshot().await.unwrap().len(), 1);

        feed.acknowledge();
        let err = feed.next_snapshot().await.unwrap_err();
        match &err {
            MonitorError::Feed(msg) => assert!(msg.contains("not rewritten")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.disposition(), crate::error::Disposition::Retry);

        std::fs::write(
            &path,
            r#"[{"seller": "S1", "item": "I1"}, {"seller": "S2", "item": "I2"}]"#,
        )
        .unwrap();
        assert_eq!(feed.next_snapshot().await.unwrap().len(), 2);
    }
}
