pub mod btrfs;
pub mod process;

use crate::snapshot::result_error::result::Result;
use crate::snapshot::transfer::cancel::CancelScope;
use derive_more::Display;
use std::io::{Read, Write};
use std::path::Path;

/// Whether backend invocations are printed, executed, or both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum ExecMode {
    #[default]
    #[display("execute")]
    Execute,
    #[display("verbose")]
    Verbose,
    #[display("dry-run")]
    DryRun,
}

impl ExecMode {
    pub fn from_flags(dry_run: bool, verbose: bool) -> Self {
        match (dry_run, verbose) {
            (true, _) => ExecMode::DryRun,
            (false, true) => ExecMode::Verbose,
            (false, false) => ExecMode::Execute,
        }
    }

    pub fn echoes(self) -> bool {
        self != ExecMode::Execute
    }

    pub fn executes(self) -> bool {
        self != ExecMode::DryRun
    }
}

/// What to send: a snapshot, the parent it is a delta against, and every
/// snapshot the receiving side already has that may be used as a clone
/// source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeltaRequest<'a> {
    pub snapshot: &'a Path,
    pub parent: Option<&'a Path>,
    pub references: Vec<&'a Path>,
}

/// Copy-on-write snapshot primitives.
///
/// Implementations block until the operation is done. `send_delta` and
/// `receive_delta` run concurrently on two threads sharing one
/// [`CancelScope`], and must return promptly once it is cancelled.
pub trait SnapshotBackend: Send + Sync {
    fn mode(&self) -> ExecMode {
        ExecMode::Execute
    }

    /// Creates a read-only snapshot of `source` at `dest`.
    fn snapshot(&self, source: &Path, dest: &Path) -> Result<()>;

    /// Writes the delta stream for `request` into `sink`.
    fn send_delta(
        &self,
        request: &DeltaRequest<'_>,
        sink: &mut (dyn Write + Send),
        cancel: &CancelScope,
    ) -> Result<()>;

    /// Materialises the delta stream read from `source` inside `dest_dir`.
    fn receive_delta(
        &self,
        source: &mut (dyn Read + Send),
        dest_dir: &Path,
        cancel: &CancelScope,
    ) -> Result<()>;

    /// Deletes the snapshot content at `content_path`.
    fn delete(&self, content_path: &Path) -> Result<()>;

    /// Human readable equivalent of one transfer, for dry runs.
    fn describe_transfer(&self, request: &DeltaRequest<'_>, dest_dir: &Path) -> String;
}
