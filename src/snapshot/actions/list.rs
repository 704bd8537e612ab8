use crate::snapshot::ago::{ago, ago_raw};
use crate::snapshot::function_path;
use crate::snapshot::record::{scan, Snapshot};
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use crate::snapshot::snapshot_config::ProfileConfig;
use chrono::{DateTime, Utc};
use function_name::named;
use itertools::Itertools;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::Metadata;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Prints one line per snapshot, oldest first, numbered from 1.
#[named]
pub fn list<W: Write + ?Sized>(
    profile: &ProfileConfig,
    now: DateTime<Utc>,
    out: &mut W,
) -> Result<()> {
    let snapshots = scan(profile.storage()).add_fn_name(function_path!())?;
    for (i, snapshot) in snapshots.iter().enumerate() {
        writeln!(
            out,
            "{:8}\t{:>10}\t{}",
            i + 1,
            ago(now - *snapshot.created(), 2),
            snapshot
        )
        .map_err(Error::from)
        .add_fn_name(function_path!())?;
    }
    Ok(())
}

/// One distinct version of a file. Field order is the listing order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct FileVersion {
    /// Path of the file on the snapshotted subvolume.
    name: PathBuf,
    modified: DateTime<Utc>,
    size: u64,
    mode: u32,
}

impl FileVersion {
    fn new(name: PathBuf, metadata: &Metadata) -> Result<Self> {
        Ok(Self {
            name,
            modified: metadata.modified()?.into(),
            size: metadata.len(),
            mode: metadata.permissions().mode(),
        })
    }
}

/// Prints every distinct version of the file at `path`, or of the files
/// directly inside the directory at `path`, found across all snapshots.
///
/// Each version is reported from the newest snapshot that holds it.
/// Relative paths are taken from the working directory.
#[named]
pub fn list_files<W: Write + ?Sized>(
    profile: &ProfileConfig,
    path: &Path,
    now: DateTime<Utc>,
    out: &mut W,
) -> Result<()> {
    let path = std::path::absolute(path)
        .map_err(Error::from)
        .with_msg(format!("cannot resolve {path:?}"))?;
    let snapshots = scan(profile.storage()).add_fn_name(function_path!())?;

    let found = snapshots
        .par_iter()
        .enumerate()
        .map(|(i, snapshot)| {
            versions_in(snapshot, &path)
                .with_msg(format!("cannot read {path:?} in {snapshot}"))
                .map(|versions| versions.into_iter().map(|v| (v, i)).collect_vec())
        })
        .collect::<Result<Vec<_>>>()
        .add_fn_name(function_path!())?;

    // snapshots are oldest first, so later inserts are newer holders
    let mut newest: BTreeMap<FileVersion, usize> = BTreeMap::new();
    for (version, i) in found.into_iter().flatten() {
        newest
            .entry(version)
            .and_modify(|held| *held = (*held).max(i))
            .or_insert(i);
    }

    for (version, i) in newest {
        writeln!(
            out,
            "{:>11}\t{:10}\t{:<8}\t{}",
            mode_string(version.mode),
            version.size,
            ago_raw(now - version.modified, 2),
            inside(snapshots[i].content_path(), &version.name).display()
        )
        .map_err(Error::from)
        .add_fn_name(function_path!())?;
    }
    Ok(())
}

/// `path` as seen from within a snapshot's subvolume.
fn inside(content_path: &Path, path: &Path) -> PathBuf {
    content_path.join(path.strip_prefix("/").unwrap_or(path))
}

fn versions_in(snapshot: &Snapshot, path: &Path) -> Result<Vec<FileVersion>> {
    let backup_path = inside(snapshot.content_path(), path);
    let metadata = match std::fs::metadata(&backup_path) {
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        res => res?,
    };
    if !metadata.is_dir() {
        return Ok(vec![FileVersion::new(path.to_path_buf(), &metadata)?]);
    }

    let entries = match std::fs::read_dir(&backup_path) {
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        res => res?,
    };
    let mut versions = Vec::new();
    for entry in entries {
        let entry = entry?;
        let metadata = match entry.metadata() {
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            res => res?,
        };
        if metadata.is_dir() {
            continue;
        }
        versions.push(FileVersion::new(path.join(entry.file_name()), &metadata)?);
    }
    Ok(versions)
}

/// `ls -l` style mode, e.g. `-rw-r--r--`.
fn mode_string(mode: u32) -> String {
    let kind = match mode & 0o170000 {
        0o040000 => 'd',
        0o120000 => 'l',
        0o020000 => 'c',
        0o060000 => 'b',
        0o010000 => 'p',
        0o140000 => 's',
        _ => '-',
    };
    let rwx = (0..9)
        .map(|bit| {
            let set = mode & (0o400 >> bit) != 0;
            match (set, bit % 3) {
                (false, _) => '-',
                (true, 0) => 'r',
                (true, 1) => 'w',
                (true, _) => 'x',
            }
        })
        .collect::<String>();
    format!("{kind}{rwx}")
}
