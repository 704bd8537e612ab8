//! On-disk snapshot records.
//!
//! Every snapshot lives in its own directory below a profile's storage
//! path, named after its creation time. The btrfs subvolume itself is the
//! nested `snapshot` directory. There is no other index: the directory
//! listing is the source of truth.

use crate::snapshot::result_error::result::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use getset::Getters;
use itertools::Itertools;
use std::fmt::{Display, Formatter};
use std::fs::read_dir;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Sortable directory name layout, always UTC.
pub static SNAPSHOT_DATE_LAYOUT: &str = "%Y-%m-%d_%H:%M:%S";
/// Name of the subvolume nested in every snapshot directory.
pub static SNAPSHOT_CONTENT_DIR: &str = "snapshot";

#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct Snapshot {
    /// `<storage>/<timestamp>`
    path: PathBuf,
    /// `<storage>/<timestamp>/snapshot`
    content_path: PathBuf,
    created: DateTime<Utc>,
}

impl Snapshot {
    pub fn new<P: Into<PathBuf>>(path: P, created: DateTime<Utc>) -> Self {
        let path = path.into();
        Self {
            content_path: path.join(SNAPSHOT_CONTENT_DIR),
            path,
            created,
        }
    }

    /// Record for a snapshot taken at `created` inside `storage`.
    pub fn in_storage<P: AsRef<Path>>(storage: P, created: DateTime<Utc>) -> Self {
        Self::new(storage.as_ref().join(snapshot_dir_name(created)), created)
    }

    pub fn name(&self) -> String {
        snapshot_dir_name(self.created)
    }
}

impl Display for Snapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

pub fn snapshot_dir_name(created: DateTime<Utc>) -> String {
    created.format(SNAPSHOT_DATE_LAYOUT).to_string()
}

/// Only the exact spelling [`snapshot_dir_name`] produces is accepted, so
/// no two directories map to the same timestamp.
pub fn parse_snapshot_dir_name(name: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(name, SNAPSHOT_DATE_LAYOUT)
        .ok()
        .map(|dt| dt.and_utc())
        .filter(|created| snapshot_dir_name(*created) == name)
}

/// Lists the snapshots stored in `dir`, oldest first.
///
/// A missing directory holds no snapshots. Entries whose name is not a
/// timestamp, or which have no nested `snapshot` directory, are skipped.
pub fn scan<P: AsRef<Path>>(dir: P) -> Result<Vec<Snapshot>> {
    let dir = dir.as_ref();
    let entries = match read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("Snapshot directory {:?} does not exist", dir);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let snapshots = entries
        .filter_map(|r| r.ok())
        .filter_map(|entry| {
            let file_name = entry.file_name();
            let Some(created) = file_name.to_str().and_then(parse_snapshot_dir_name) else {
                tracing::trace!("Skipping {:?}, not a snapshot name", entry.path());
                return None;
            };
            let snapshot = Snapshot::new(entry.path(), created);
            // symlink_metadata so a link named "snapshot" does not count
            match std::fs::symlink_metadata(&snapshot.content_path) {
                Ok(md) if md.is_dir() => Some(snapshot),
                _ => {
                    tracing::trace!("Skipping {:?}, no snapshot content", entry.path());
                    None
                }
            }
        })
        .sorted_by_key(|s| s.created)
        .collect_vec();

    tracing::debug!("Found {} snapshots in {:?}", snapshots.len(), dir);
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn make_snapshot_dir(storage: &Path, name: &str) {
        std::fs::create_dir_all(storage.join(name).join(SNAPSHOT_CONTENT_DIR)).unwrap();
    }

    #[test]
    fn test_dir_name_round_trip() {
        let created = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(snapshot_dir_name(created), "2021-03-04_05:06:07");
        assert_eq!(parse_snapshot_dir_name("2021-03-04_05:06:07"), Some(created));
    }

    #[test]
    fn test_parse_rejects_other_names() {
        assert_eq!(parse_snapshot_dir_name("2021-03-04_05:06:07.recv.abc"), None);
        assert_eq!(parse_snapshot_dir_name("lost+found"), None);
        assert_eq!(parse_snapshot_dir_name(""), None);
        assert_eq!(parse_snapshot_dir_name("2021-3-4_5:6:7"), None);
        assert_eq!(parse_snapshot_dir_name(" 2021-03-04_05:06:07"), None);
    }

    #[test]
    fn test_scan_skips_short_fields() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_dir.path();
        make_snapshot_dir(storage, "2021-1-1_0:0:0");
        make_snapshot_dir(storage, "2021-01-01_00:00:00");

        let snapshots = scan(storage).unwrap();
        assert_eq!(
            snapshots.iter().map(Snapshot::name).collect_vec(),
            vec!["2021-01-01_00:00:00"]
        );
        assert_eq!(snapshots[0].path(), &storage.join("2021-01-01_00:00:00"));
    }

    #[test]
    fn test_scan_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let snapshots = scan(temp_dir.path().join("does-not-exist")).unwrap();
        assert!(snapshots.is_empty());
    }

    #[test]
    fn test_scan_sorts_and_skips() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_dir.path();
        make_snapshot_dir(storage, "2021-03-04_05:06:07");
        make_snapshot_dir(storage, "2020-01-01_00:00:00");
        make_snapshot_dir(storage, "not-a-date");
        make_snapshot_dir(storage, "2021-03-04_05:06:07.recv.x1y2z3");
        // timestamp but no content
        std::fs::create_dir_all(storage.join("2022-01-01_00:00:00")).unwrap();
        // content is a file, not a directory
        std::fs::create_dir_all(storage.join("2023-01-01_00:00:00")).unwrap();
        std::fs::write(storage.join("2023-01-01_00:00:00").join("snapshot"), "x").unwrap();
        std::fs::write(storage.join("2024-01-01_00:00:00"), "plain file").unwrap();

        let snapshots = scan(storage).unwrap();
        let names = snapshots.iter().map(Snapshot::name).collect_vec();
        assert_eq!(names, vec!["2020-01-01_00:00:00", "2021-03-04_05:06:07"]);
        assert_eq!(
            snapshots[0].content_path(),
            &storage.join("2020-01-01_00:00:00").join("snapshot")
        );
    }

    #[test]
    fn test_in_storage_paths() {
        let created = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        let s = Snapshot::in_storage("/backup", created);
        assert_eq!(s.path(), Path::new("/backup/2021-03-04_05:06:07"));
        assert_eq!(
            s.content_path(),
            Path::new("/backup/2021-03-04_05:06:07/snapshot")
        );
        assert_eq!(s.to_string(), "/backup/2021-03-04_05:06:07");
    }
}
