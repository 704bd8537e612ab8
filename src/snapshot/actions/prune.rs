use crate::snapshot::backend::SnapshotBackend;
use crate::snapshot::cascade::classify;
use crate::snapshot::function_path;
use crate::snapshot::record::{scan, Snapshot};
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use crate::snapshot::snapshot_config::ProfileConfig;
use function_name::named;

/// Deletes every snapshot the profile's retention evicts.
///
/// Stops at the first failure. Snapshots deleted before that stay deleted.
#[named]
pub fn prune<B: SnapshotBackend + ?Sized>(
    profile: &ProfileConfig,
    backend: &B,
) -> Result<Vec<Snapshot>> {
    let tiers = profile.tiers()?;
    let snapshots = scan(profile.storage())?;
    let total = snapshots.len();
    let evicted = classify(&tiers, snapshots)
        .add_fn_name(function_path!())?
        .into_evicted();
    tracing::info!(
        "Pruning {} of {} snapshots in {:?}",
        evicted.len(),
        total,
        profile.storage()
    );

    for snapshot in &evicted {
        remove(snapshot, backend)
            .with_msg(format!("cannot delete {}", snapshot))
            .add_fn_name(function_path!())?;
    }
    Ok(evicted)
}

fn remove<B: SnapshotBackend + ?Sized>(snapshot: &Snapshot, backend: &B) -> Result<()> {
    tracing::info!("Deleting {}", snapshot);
    if snapshot.content_path().exists() {
        backend.delete(snapshot.content_path())?;
    }
    if backend.mode().executes() {
        std::fs::remove_dir(snapshot.path()).map_err(Error::from)?;
    }
    Ok(())
}
