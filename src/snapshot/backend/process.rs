//! Running external commands with captured diagnostics.

use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use crate::snapshot::result_error::WithMsg;
use crate::snapshot::transfer::cancel::{CancelScope, POLL_INTERVAL};
use itertools::Itertools;
use std::io;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::thread::ScopedJoinHandle;

fn is_plain(arg: &str) -> bool {
    !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '/' | '@' | '_'))
}

/// Quotes arguments that a shell would not take literally. With `max > 0`,
/// long lists keep the first argument and the last `max` ones.
pub fn escaped_args<S: AsRef<str>>(args: &[S], max: usize) -> Vec<String> {
    let shown = if max > 0 && args.len() > max {
        std::iter::once(args[0].as_ref())
            .chain(std::iter::once("..."))
            .chain(args[args.len() - max..].iter().map(AsRef::as_ref))
            .collect_vec()
    } else {
        args.iter().map(AsRef::as_ref).collect_vec()
    };
    shown
        .into_iter()
        .map(|a| {
            if is_plain(a) || a == "..." {
                a.to_string()
            } else {
                format!("{a:?}")
            }
        })
        .collect_vec()
}

pub fn command_line<S: AsRef<str>>(program: &str, args: &[S], max: usize) -> String {
    std::iter::once(program.to_string())
        .chain(escaped_args(args, max))
        .join(" ")
}

/// First line of `stderr` plus how many more there were.
pub fn stderr_sample(stderr: &[u8]) -> Option<String> {
    let raw = String::from_utf8_lossy(stderr);
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let lines = raw.lines().collect_vec();
    let mut sample = lines[0].to_string();
    if lines.len() > 1 {
        sample.push_str(&format!(" [{} more lines...]", lines.len() - 1));
    }
    Some(sample)
}

fn command_error(name: &str, status: ExitStatus, stderr: &[u8]) -> Error {
    Error::Command {
        program: name.to_string(),
        status: status.to_string(),
        stderr: stderr_sample(stderr),
    }
}

fn spawn(command: &mut Command, name: &str) -> Result<Child> {
    tracing::debug!("Starting {name}: {:?}", command);
    command
        .spawn()
        .map_err(Error::from)
        .with_msg(format!("cannot start {name}"))
}

fn missing_pipe(name: &str, which: &str) -> Error {
    Error::from(io::Error::other(format!("{name} has no {which} pipe")))
}

/// Runs `command` to completion with stdin closed and stderr captured.
pub fn run_captured(command: &mut Command, name: &str) -> Result<()> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let output = spawn(command, name)?
        .wait_with_output()
        .map_err(Error::from)
        .with_msg(format!("cannot wait for {name}"))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(command_error(name, output.status, &output.stderr))
    }
}

/// Waits for `child`, killing it once `cancel` fires. `None` means killed.
fn wait_or_kill(
    child: &mut Child,
    name: &str,
    cancel: &CancelScope,
) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if cancel.wait_timeout(POLL_INTERVAL) {
            tracing::debug!("Killing {name} after cancellation");
            // already exited between try_wait and kill is fine
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
    }
}

/// Cancels the scope as soon as the child failed, so the peer stops
/// before the pump notices. Returns whether the scope was already
/// cancelled by someone else.
fn cancel_on_failure(
    status: &io::Result<Option<ExitStatus>>,
    name: &str,
    cancel: &CancelScope,
) -> bool {
    let failed = match status {
        Ok(Some(status)) => !status.success(),
        Ok(None) => false,
        Err(_) => true,
    };
    if failed && cancel.cancel() {
        tracing::debug!("{name} failed, cancelling its peer");
        return false;
    }
    cancel.is_cancelled()
}

fn join<T>(handle: ScopedJoinHandle<'_, T>, what: &'static str) -> Result<T> {
    handle.join().map_err(|_| Error::ThreadPanicked(what))
}

fn read_all<R: Read>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf) {
        tracing::warn!("Reading stderr failed: {e}");
    }
    buf
}

/// Child status wins over pump failures: a pump usually fails because the
/// child died.
fn settle(
    name: &str,
    status: io::Result<Option<ExitStatus>>,
    pumped: io::Result<u64>,
    stderr: &[u8],
    peer_cancelled: bool,
    cancel: &CancelScope,
) -> Result<()> {
    let status = status
        .map_err(Error::from)
        .with_msg(format!("cannot wait for {name}"))?;
    match status {
        None => Err(Error::Cancelled),
        Some(status) if !status.success() => {
            if peer_cancelled && stderr.is_empty() {
                Err(Error::Cancelled)
            } else {
                Err(command_error(name, status, stderr))
            }
        }
        Some(_) => match pumped {
            Ok(bytes) => {
                tracing::debug!("{name} done, {bytes} bytes streamed");
                Ok(())
            }
            Err(_) if cancel.is_cancelled() => Err(Error::Cancelled),
            Err(e) => Err(Error::from(e).with_msg(format!("{name}: streaming failed"))),
        },
    }
}

/// Runs `command` and streams its stdout into `sink` until it exits.
pub fn run_with_stdout(
    command: &mut Command,
    name: &str,
    sink: &mut (dyn Write + Send),
    cancel: &CancelScope,
) -> Result<()> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = spawn(command, name)?;
    let mut stdout = child.stdout.take().ok_or_else(|| missing_pipe(name, "stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe(name, "stderr"))?;

    thread::scope(|s| {
        let stderr = s.spawn(move || read_all(stderr));
        let pump = s.spawn(move || {
            let res = io::copy(&mut stdout, sink);
            if res.is_err() {
                cancel.cancel();
            }
            res
        });
        let status = wait_or_kill(&mut child, name, cancel);
        let peer_cancelled = cancel_on_failure(&status, name, cancel);
        let pumped = join(pump, "stdout pump")?;
        let stderr = join(stderr, "stderr reader")?;
        settle(name, status, pumped, &stderr, peer_cancelled, cancel)
    })
}

/// Runs `command` feeding `source` into its stdin until it exits.
pub fn run_with_stdin(
    command: &mut Command,
    name: &str,
    source: &mut (dyn Read + Send),
    cancel: &CancelScope,
) -> Result<()> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = spawn(command, name)?;
    let mut stdin = child.stdin.take().ok_or_else(|| missing_pipe(name, "stdin"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing_pipe(name, "stderr"))?;

    thread::scope(|s| {
        let stderr = s.spawn(move || read_all(stderr));
        let pump = s.spawn(move || {
            let res = io::copy(source, &mut stdin);
            if res.is_err() {
                cancel.cancel();
            }
            // closing stdin is the end of stream for the child
            drop(stdin);
            res
        });
        let status = wait_or_kill(&mut child, name, cancel);
        let peer_cancelled = cancel_on_failure(&status, name, cancel);
        let pumped = join(pump, "stdin pump")?;
        let stderr = join(stderr, "stderr reader")?;
        settle(name, status, pumped, &stderr, peer_cancelled, cancel)
    })
}
