use crate::snapshot::backend::SnapshotBackend;
use crate::snapshot::function_path;
use crate::snapshot::planner::BackupPlan;
use crate::snapshot::record::{scan, Snapshot};
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use crate::snapshot::snapshot_config::Config;
use crate::snapshot::transfer::transfer;
use function_name::named;

/// Copies the snapshots the backup profile `name` is missing from its
/// source profile, oldest first.
///
/// Every snapshot sent becomes a base for the ones after it. The first
/// failed transfer aborts the run; snapshots published before it stay.
/// Returns the published records, none for a dry run.
#[named]
pub fn backup<B: SnapshotBackend + ?Sized>(
    config: &Config,
    name: &str,
    backend: &B,
) -> Result<Vec<Snapshot>> {
    let profile = config.profile(name)?;
    let source = config.source_of(name)?;
    let tiers = profile.tiers()?;

    let have = scan(source.storage()).add_fn_name(function_path!())?;
    let at_dest = scan(profile.storage()).add_fn_name(function_path!())?;
    let (to_send, mut bases) = BackupPlan::new(&have, &at_dest, &tiers)
        .add_fn_name(function_path!())?
        .into_parts();

    let mut published = Vec::with_capacity(to_send.len());
    for snapshot in to_send {
        let sent = transfer(&snapshot, &bases, profile.storage(), backend)
            .with_msg(format!("cannot backup {}", snapshot))
            .add_fn_name(function_path!())?;
        published.extend(sent);
        let at = bases.partition_point(|b| b.created() < snapshot.created());
        bases.insert(at, snapshot);
    }
    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::actions::tests::RecordingBackend;
    use crate::snapshot::backend::ExecMode;
    use crate::snapshot::cascade::tests::{at_minutes, minutes_of};
    use crate::snapshot::interval::BucketInterval;
    use crate::snapshot::result_error::error::Error;
    use crate::snapshot::snapshot_config::{ProfileConfig, TierConfig};
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    struct Setup {
        _temp_dir: TempDir,
        source: PathBuf,
        dest: PathBuf,
        config: Config,
    }

    fn setup(source_minutes: &[i64], dest_minutes: &[i64], bucket: (&str, usize)) -> Setup {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("src");
        let dest = temp_dir.path().join("dst");
        populate(&source, source_minutes);
        populate(&dest, dest_minutes);

        let config = Config::builder()
            .profiles(BTreeMap::from([
                (
                    "home".to_string(),
                    ProfileConfig::builder()
                        .subvolume("/home")
                        .storage(&source)
                        .build(),
                ),
                (
                    "offsite".to_string(),
                    ProfileConfig::builder()
                        .backup("home")
                        .storage(&dest)
                        .buckets(vec![TierConfig::builder()
                            .interval(bucket.0.parse::<BucketInterval>().unwrap())
                            .size(bucket.1)
                            .build()])
                        .build(),
                ),
            ]))
            .build();
        Setup {
            _temp_dir: temp_dir,
            source,
            dest,
            config,
        }
    }

    fn populate(storage: &Path, minutes: &[i64]) {
        for m in minutes {
            let snapshot = Snapshot::in_storage(storage, *at_minutes(*m).created());
            std::fs::create_dir_all(snapshot.content_path()).unwrap();
        }
    }

    fn content_of(storage: &Path, minutes: i64) -> String {
        Snapshot::in_storage(storage, *at_minutes(minutes).created())
            .content_path()
            .display()
            .to_string()
    }

    #[test]
    fn test_backup_sends_missing_with_parent() {
        let setup = setup(&[100, 200, 250], &[100, 200], ("50m", 2));
        let backend = RecordingBackend::default();

        let published = backup(&setup.config, "offsite", &backend).unwrap();
        assert_eq!(minutes_of(&published), vec![250]);
        assert_eq!(
            backend.calls(),
            vec![format!(
                "send {} parent={}",
                content_of(&setup.source, 250),
                content_of(&setup.source, 200)
            )]
        );
        assert_eq!(minutes_of(&scan(&setup.dest).unwrap()), vec![100, 200, 250]);
        let origin = std::fs::read_to_string(
            published[0].content_path().join("origin"),
        )
        .unwrap();
        assert_eq!(origin, content_of(&setup.source, 250));
    }

    #[test]
    fn test_backup_chains_parents() {
        let setup = setup(&[0, 60, 120], &[], ("1h", 5));
        let backend = RecordingBackend::default();

        let published = backup(&setup.config, "offsite", &backend).unwrap();
        assert_eq!(minutes_of(&published), vec![0, 60, 120]);
        assert_eq!(
            backend.calls(),
            vec![
                format!("send {} parent=", content_of(&setup.source, 0)),
                format!(
                    "send {} parent={}",
                    content_of(&setup.source, 60),
                    content_of(&setup.source, 0)
                ),
                format!(
                    "send {} parent={}",
                    content_of(&setup.source, 120),
                    content_of(&setup.source, 60)
                ),
            ]
        );
    }

    #[test]
    fn test_backup_skips_unwanted() {
        let setup = setup(&[0, 10, 20, 70, 130], &[], ("1h", 2));
        let backend = RecordingBackend::default();

        let published = backup(&setup.config, "offsite", &backend).unwrap();
        assert_eq!(minutes_of(&published), vec![70, 130]);
        assert_eq!(minutes_of(&scan(&setup.dest).unwrap()), vec![70, 130]);
    }

    #[test]
    fn test_backup_aborts_on_first_failure() {
        let setup = setup(&[0, 60, 120], &[], ("1h", 5));
        let backend = RecordingBackend::failing();

        let err = backup(&setup.config, "offsite", &backend).unwrap_err();
        assert!(err.to_string().contains("cannot backup"), "{err}");
        assert_eq!(backend.calls().len(), 1);
        assert!(scan(&setup.dest).unwrap().is_empty());
        // no staging directory left behind
        assert_eq!(std::fs::read_dir(&setup.dest).unwrap().count(), 0);
    }

    #[test]
    fn test_backup_dry_run_publishes_nothing() {
        let setup = setup(&[0, 60], &[], ("1h", 5));
        let backend = RecordingBackend::with_mode(ExecMode::DryRun);

        let published = backup(&setup.config, "offsite", &backend).unwrap();
        assert!(published.is_empty());
        assert!(backend.calls().is_empty());
        assert!(!setup.dest.exists());
    }

    #[test]
    fn test_backup_of_snapshot_profile_fails() {
        let setup = setup(&[0], &[], ("1h", 5));
        let backend = RecordingBackend::default();
        let res = backup(&setup.config, "home", &backend);
        assert!(matches!(res, Err(Error::WrongProfileKind { .. })));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_backup_of_unknown_profile_fails() {
        let setup = setup(&[], &[], ("1h", 5));
        let backend = RecordingBackend::default();
        let err = backup(&setup.config, "nope", &backend).unwrap_err();
        assert!(err.to_string().contains("\"home\", \"offsite\""), "{err}");
        assert!(backend.calls().is_empty());
    }
}
