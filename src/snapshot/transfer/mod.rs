//! Incremental transfer of one snapshot to a backup storage.
//!
//! The sending and receiving halves run on two threads joined by an
//! in-memory pipe. Data lands in a uniquely named staging directory that
//! is only renamed to the snapshot's final name once both halves are done,
//! so a half received snapshot is never visible under its real name.

pub mod cancel;
pub mod pipe;

use crate::snapshot::backend::{DeltaRequest, SnapshotBackend};
use crate::snapshot::function_path;
use crate::snapshot::planner::parent_of;
use crate::snapshot::record::{Snapshot, SNAPSHOT_CONTENT_DIR};
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::{AddFunctionName, WithMsg};
use cancel::CancelScope;
use function_name::named;
use itertools::Itertools;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::thread;
use tempfile::TempDir;

static STAGING_DIR_MODE: u32 = 0o755;

/// Sends `snapshot` to `dest_storage` as a delta against `bases`.
///
/// Returns the record of the published snapshot, or `None` for a dry run.
#[named]
pub fn transfer<B: SnapshotBackend + ?Sized>(
    snapshot: &Snapshot,
    bases: &[Snapshot],
    dest_storage: &Path,
    backend: &B,
) -> Result<Option<Snapshot>> {
    let parent = parent_of(snapshot, bases);
    let request = DeltaRequest {
        snapshot: snapshot.content_path(),
        parent: parent.map(|p| p.content_path().as_path()),
        references: bases.iter().map(|b| b.content_path().as_path()).collect_vec(),
    };
    let name = snapshot.name();
    let mode = backend.mode();

    if mode.echoes() {
        let staging_hint = dest_storage.join(format!("{name}.recv.XXXXXX"));
        eprintln!("{}", backend.describe_transfer(&request, &staging_hint));
    }
    if !mode.executes() {
        return Ok(None);
    }

    tracing::info!(
        "Sending {} to {:?} (parent: {:?}, {} references)",
        name,
        dest_storage,
        parent.map(Snapshot::name),
        request.references.len()
    );

    std::fs::create_dir_all(dest_storage)
        .map_err(Error::from)
        .with_msg(format!("cannot create {dest_storage:?}"))?;
    let staging = tempfile::Builder::new()
        .prefix(&format!("{name}.recv."))
        .tempdir_in(dest_storage)
        .map_err(Error::from)
        .with_msg(format!("cannot create staging directory in {dest_storage:?}"))?;
    std::fs::set_permissions(
        staging.path(),
        std::fs::Permissions::from_mode(STAGING_DIR_MODE),
    )?;

    if let Err(e) = stream(&request, staging.path(), backend) {
        discard(staging, backend);
        return Err(e).add_fn_name(function_path!());
    }

    let published = Snapshot::in_storage(dest_storage, *snapshot.created());
    publish(staging, published.path(), backend)
        .with_msg(format!("cannot publish {}", published))
        .add_fn_name(function_path!())?;
    tracing::info!("Published {}", published);
    Ok(Some(published))
}

/// Runs both halves under one cancel scope and waits for both.
fn stream<B: SnapshotBackend + ?Sized>(
    request: &DeltaRequest<'_>,
    staging: &Path,
    backend: &B,
) -> Result<()> {
    let scope = CancelScope::new();
    let scope = &scope;
    let (writer, reader) = pipe::pipe(scope);

    let (emitted, consumed) = thread::scope(|s| {
        let emit = s.spawn(move || {
            let mut writer = writer;
            let res = backend.send_delta(request, &mut writer, scope);
            if res.is_err() {
                scope.cancel();
            }
            // cancel before hanging up, so the reader does not take the
            // hang up for a clean end of stream
            drop(writer);
            res
        });
        let consume = s.spawn(move || {
            let mut reader = reader;
            let res = backend.receive_delta(&mut reader, staging, scope);
            if res.is_err() {
                scope.cancel();
            }
            drop(reader);
            res
        });
        (
            emit.join()
                .map_err(|_| Error::ThreadPanicked("send"))
                .and_then(std::convert::identity),
            consume
                .join()
                .map_err(|_| Error::ThreadPanicked("receive"))
                .and_then(std::convert::identity),
        )
    });

    match (emitted, consumed) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) => Err(e.with_msg("send failed")),
        (Ok(()), Err(e)) => Err(e.with_msg("receive failed")),
        // the half that only saw the cancellation is noise
        (Err(send), Err(receive)) if receive.is_cancelled() => Err(send.with_msg("send failed")),
        (Err(send), Err(receive)) if send.is_cancelled() => {
            Err(receive.with_msg("receive failed"))
        }
        (Err(send), Err(receive)) => Err(send
            .with_msg("send failed")
            .chain(receive.with_msg("receive failed"))),
    }
}

/// Renames the staging directory to `final_path`.
fn publish<B: SnapshotBackend + ?Sized>(
    staging: TempDir,
    final_path: &Path,
    backend: &B,
) -> Result<()> {
    // an empty directory left behind by an earlier attempt
    if let Err(e) = std::fs::remove_dir(final_path) {
        tracing::trace!("No stale directory at {:?}: {e}", final_path);
    }
    let staging_path = staging.keep();
    std::fs::rename(&staging_path, final_path).map_err(|e| {
        let mut error = Error::from(e);
        if let Err(cleanup) = remove_staging(&staging_path, backend) {
            error = error.chain(cleanup.with_msg("cannot remove staging directory"));
        }
        error
    })
}

fn remove_staging<B: SnapshotBackend + ?Sized>(staging: &Path, backend: &B) -> Result<()> {
    let content = staging.join(SNAPSHOT_CONTENT_DIR);
    if content.exists() {
        backend.delete(&content)?;
    }
    std::fs::remove_dir_all(staging)?;
    Ok(())
}

/// Best effort cleanup after a failed transfer.
fn discard<B: SnapshotBackend + ?Sized>(staging: TempDir, backend: &B) {
    let content = staging.path().join(SNAPSHOT_CONTENT_DIR);
    if content.exists() {
        if let Err(e) = backend.delete(&content) {
            tracing::warn!("Cannot delete partially received {:?}: {e}", content);
        }
    }
    if let Err(e) = staging.close() {
        tracing::warn!("Cannot remove staging directory: {e}");
    }
}
