use crate::snapshot::backend::SnapshotBackend;
use crate::snapshot::function_path;
use crate::snapshot::record::Snapshot;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use crate::snapshot::snapshot_config::ProfileConfig;
use chrono::{DateTime, SubsecRound, Utc};
use function_name::named;
use std::io::ErrorKind;

/// Takes a read-only snapshot of the profile's subvolume at `now`.
///
/// Refuses to overwrite a snapshot taken within the same second.
#[named]
pub fn create<B: SnapshotBackend + ?Sized>(
    name: &str,
    profile: &ProfileConfig,
    backend: &B,
    now: DateTime<Utc>,
) -> Result<Snapshot> {
    let subvolume = profile.subvolume().as_ref().ok_or_else(|| Error::WrongProfileKind {
        name: name.to_string(),
        actual: "a backup profile",
    })?;
    let snapshot = Snapshot::in_storage(profile.storage(), now.trunc_subsecs(0));

    if backend.mode().executes() {
        std::fs::create_dir_all(profile.storage())
            .map_err(Error::from)
            .with_msg(format!("cannot create {:?}", profile.storage()))?;
        match std::fs::create_dir(snapshot.path()) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::DuplicateSnapshot(*snapshot.created()))
                    .add_fn_name(function_path!())
            }
            res => res
                .map_err(Error::from)
                .with_msg(format!("cannot create {:?}", snapshot.path()))?,
        }
    }

    tracing::info!("Creating snapshot {} of {:?}", snapshot, subvolume);
    if let Err(e) = backend.snapshot(subvolume, snapshot.content_path()) {
        // snapshots are atomic, only the empty directory is left to clean
        if backend.mode().executes() {
            if let Err(cleanup) = std::fs::remove_dir(snapshot.path()) {
                tracing::warn!("Cannot remove {:?}: {cleanup}", snapshot.path());
            }
        }
        return Err(e).add_fn_name(function_path!());
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::actions::tests::RecordingBackend;
    use crate::snapshot::record::scan;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn profile(storage: &std::path::Path) -> ProfileConfig {
        ProfileConfig::builder()
            .subvolume("/home")
            .storage(storage)
            .build()
    }

    #[test]
    fn test_create_makes_snapshot_dir() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_dir.path().join("snaps");
        let backend = RecordingBackend::default();
        let now = Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 0).unwrap();

        let snapshot = create("home", &profile(&storage), &backend, now).unwrap();
        assert_eq!(snapshot.path(), &storage.join("2021-06-01_12:30:00"));
        assert_eq!(
            backend.calls(),
            vec![format!(
                "snapshot /home {}",
                storage.join("2021-06-01_12:30:00/snapshot").display()
            )]
        );
        let scanned = scan(&storage).unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].created(), &now);
    }

    #[test]
    fn test_create_refuses_same_second() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_dir.path().to_path_buf();
        let backend = RecordingBackend::default();
        let now = Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 0).unwrap();
        create("home", &profile(&storage), &backend, now).unwrap();

        let later_same_second = now + chrono::Duration::milliseconds(400);
        let err = create("home", &profile(&storage), &backend, later_same_second).unwrap_err();
        assert!(err.to_string().contains("already exists"), "{err}");
        assert_eq!(backend.calls().len(), 1);
    }

    #[test]
    fn test_create_failure_removes_dir() {
        let temp_dir = TempDir::new().unwrap();
        let storage = temp_dir.path().to_path_buf();
        let backend = RecordingBackend::failing();
        let now = Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 0).unwrap();
        assert!(create("home", &profile(&storage), &backend, now).is_err());
        assert!(!storage.join("2021-06-01_12:30:00").exists());
    }

    #[test]
    fn test_create_on_backup_profile_fails() {
        let profile = ProfileConfig::builder().backup("home").storage("/s").build();
        let backend = RecordingBackend::default();
        let res = create("offsite", &profile, &backend, Utc::now());
        assert!(matches!(res, Err(Error::WrongProfileKind { .. })));
        assert!(backend.calls().is_empty());
    }
}
