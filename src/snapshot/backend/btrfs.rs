use crate::snapshot::backend::process::{
    command_line, run_captured, run_with_stdin, run_with_stdout,
};
use crate::snapshot::backend::{DeltaRequest, ExecMode, SnapshotBackend};
use crate::snapshot::result_error::result::Result;
use crate::snapshot::transfer::cancel::CancelScope;
use bon::Builder;
use getset::{CopyGetters, Getters};
use itertools::Itertools;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

pub static DEFAULT_BTRFS_BIN: &str = "btrfs";

/// Arguments shown for a single command before eliding.
static ECHO_MAX_ARGS: usize = 10;
/// Arguments shown per side of an echoed send/receive pipeline.
static ECHO_MAX_PIPELINE_ARGS: usize = 3;

/// Drives the `btrfs` command line tool.
#[derive(Clone, Debug, Builder, Getters, CopyGetters)]
pub struct BtrfsBackend {
    /// Name or path of the binary, looked up in `$PATH`.
    #[builder(into, default = PathBuf::from(DEFAULT_BTRFS_BIN))]
    #[getset(get = "pub")]
    binary: PathBuf,
    #[builder(default)]
    #[getset(get_copy = "pub")]
    exec_mode: ExecMode,
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

impl BtrfsBackend {
    fn program(&self) -> String {
        path_arg(&self.binary)
    }

    fn send_args(request: &DeltaRequest<'_>) -> Vec<String> {
        let mut args = vec!["send".to_string()];
        for reference in &request.references {
            args.push("-c".into());
            args.push(path_arg(reference));
        }
        if let Some(parent) = request.parent {
            args.push("-p".into());
            args.push(path_arg(parent));
        }
        args.push(path_arg(request.snapshot));
        args
    }

    fn receive_args(dest_dir: &Path) -> Vec<String> {
        vec!["receive".to_string(), path_arg(dest_dir)]
    }

    /// Prints and/or runs `btrfs <args>` according to the exec mode.
    fn run(&self, args: &[String]) -> Result<()> {
        if self.exec_mode.echoes() {
            eprintln!("{}", command_line(&self.program(), args, ECHO_MAX_ARGS));
        }
        if !self.exec_mode.executes() {
            return Ok(());
        }
        let name = format!("{} {}", self.program(), args.first().map_or("", String::as_str));
        run_captured(Command::new(&self.binary).args(args), &name)
    }
}

impl SnapshotBackend for BtrfsBackend {
    fn mode(&self) -> ExecMode {
        self.exec_mode
    }

    fn snapshot(&self, source: &Path, dest: &Path) -> Result<()> {
        let args = ["subvolume", "snapshot", "-r"]
            .into_iter()
            .map(String::from)
            .chain([path_arg(source), path_arg(dest)])
            .collect_vec();
        self.run(&args)
    }

    fn send_delta(
        &self,
        request: &DeltaRequest<'_>,
        sink: &mut (dyn Write + Send),
        cancel: &CancelScope,
    ) -> Result<()> {
        let name = format!("{} send", self.program());
        run_with_stdout(
            Command::new(&self.binary).args(Self::send_args(request)),
            &name,
            sink,
            cancel,
        )
    }

    fn receive_delta(
        &self,
        source: &mut (dyn Read + Send),
        dest_dir: &Path,
        cancel: &CancelScope,
    ) -> Result<()> {
        let name = format!("{} receive", self.program());
        run_with_stdin(
            Command::new(&self.binary).args(Self::receive_args(dest_dir)),
            &name,
            source,
            cancel,
        )
    }

    fn delete(&self, content_path: &Path) -> Result<()> {
        let args = vec![
            "subvolume".to_string(),
            "delete".to_string(),
            path_arg(content_path),
        ];
        self.run(&args)
    }

    fn describe_transfer(&self, request: &DeltaRequest<'_>, dest_dir: &Path) -> String {
        format!(
            "{} | {}",
            command_line(&self.program(), &Self::send_args(request), ECHO_MAX_PIPELINE_ARGS),
            command_line(&self.program(), &Self::receive_args(dest_dir), ECHO_MAX_PIPELINE_ARGS)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::result_error::error::Error;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Fake `btrfs` that appends its arguments to a log file.
    fn fake_btrfs(dir: &Path, exit_code: i32) -> PathBuf {
        let bin = dir.join("btrfs");
        let log = dir.join("calls.log");
        std::fs::write(
            &bin,
            format!(
                "#!/bin/sh\necho \"$@\" >> {:?}\necho 'ERROR: fake failure' >&2\nexit {}\n",
                log, exit_code
            ),
        )
        .unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        bin
    }

    fn calls(dir: &Path) -> String {
        std::fs::read_to_string(dir.join("calls.log")).unwrap_or_default()
    }

    #[test]
    fn test_send_args_with_parent_and_references() {
        let request = DeltaRequest {
            snapshot: Path::new("/s/3/snapshot"),
            parent: Some(Path::new("/s/2/snapshot")),
            references: vec![Path::new("/s/1/snapshot"), Path::new("/s/2/snapshot")],
        };
        assert_eq!(
            BtrfsBackend::send_args(&request),
            vec![
                "send",
                "-c",
                "/s/1/snapshot",
                "-c",
                "/s/2/snapshot",
                "-p",
                "/s/2/snapshot",
                "/s/3/snapshot"
            ]
        );
    }

    #[test]
    fn test_send_args_full_send() {
        let request = DeltaRequest {
            snapshot: Path::new("/s/1/snapshot"),
            parent: None,
            references: vec![],
        };
        assert_eq!(BtrfsBackend::send_args(&request), vec!["send", "/s/1/snapshot"]);
    }

    #[test]
    fn test_describe_transfer() {
        let backend = BtrfsBackend::builder().build();
        let request = DeltaRequest {
            snapshot: Path::new("/s/3/snapshot"),
            parent: Some(Path::new("/s/2/snapshot")),
            references: vec![Path::new("/s/1/snapshot"), Path::new("/s/2/snapshot")],
        };
        assert_eq!(
            backend.describe_transfer(&request, Path::new("/b/3.recv.x")),
            "btrfs send ... -p /s/2/snapshot /s/3/snapshot | btrfs receive /b/3.recv.x"
        );
    }

    #[test]
    fn test_snapshot_and_delete_invoke_binary() {
        let temp_dir = TempDir::new().unwrap();
        let backend = BtrfsBackend::builder()
            .binary(fake_btrfs(temp_dir.path(), 0))
            .build();
        backend
            .snapshot(Path::new("/home"), Path::new("/snaps/x/snapshot"))
            .unwrap();
        backend.delete(Path::new("/snaps/x/snapshot")).unwrap();
        assert_eq!(
            calls(temp_dir.path()),
            "subvolume snapshot -r /home /snaps/x/snapshot\nsubvolume delete /snaps/x/snapshot\n"
        );
    }

    #[test]
    fn test_failure_reports_stderr() {
        let temp_dir = TempDir::new().unwrap();
        let backend = BtrfsBackend::builder()
            .binary(fake_btrfs(temp_dir.path(), 1))
            .build();
        let err = backend.delete(Path::new("/snaps/x/snapshot")).unwrap_err();
        match err {
            Error::Command { stderr, .. } => {
                assert_eq!(stderr.as_deref(), Some("ERROR: fake failure"))
            }
            e => panic!("Expected Command error, got {e}"),
        }
    }

    #[test]
    fn test_dry_run_does_not_execute() {
        let temp_dir = TempDir::new().unwrap();
        let backend = BtrfsBackend::builder()
            .binary(fake_btrfs(temp_dir.path(), 1))
            .exec_mode(ExecMode::DryRun)
            .build();
        backend.delete(Path::new("/snaps/x/snapshot")).unwrap();
        assert_eq!(calls(temp_dir.path()), "");
    }
}
