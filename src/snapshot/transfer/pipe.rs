//! Bounded in-memory byte stream between the two halves of a transfer.
//!
//! Dropping the writer ends the stream. Dropping the reader makes further
//! writes fail with `BrokenPipe`. Both ends give up with an error once the
//! shared [`CancelScope`] is cancelled, so neither can block forever.

use crate::snapshot::transfer::cancel::{CancelScope, POLL_INTERVAL};
use std::io;
use std::io::{ErrorKind, Read, Write};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};

/// Largest chunk handed over in one message.
static MAX_CHUNK: usize = 64 * 1024;
/// Chunks in flight before the writer has to wait.
static DEFAULT_CHUNKS: usize = 16;

pub fn pipe(scope: &CancelScope) -> (PipeWriter<'_>, PipeReader<'_>) {
    pipe_with_capacity(scope, DEFAULT_CHUNKS)
}

pub fn pipe_with_capacity(scope: &CancelScope, chunks: usize) -> (PipeWriter<'_>, PipeReader<'_>) {
    let (tx, rx) = sync_channel(chunks);
    (
        PipeWriter { tx, scope },
        PipeReader {
            rx,
            current: Vec::new(),
            pos: 0,
            scope,
        },
    )
}

fn cancelled() -> io::Error {
    io::Error::other("delta stream cancelled")
}

pub struct PipeWriter<'a> {
    tx: SyncSender<Vec<u8>>,
    scope: &'a CancelScope,
}

impl Write for PipeWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = buf.len().min(MAX_CHUNK);
        let mut chunk = buf[..n].to_vec();
        loop {
            if self.scope.is_cancelled() {
                return Err(cancelled());
            }
            match self.tx.try_send(chunk) {
                Ok(()) => return Ok(n),
                Err(TrySendError::Full(c)) => {
                    chunk = c;
                    self.scope.wait_timeout(POLL_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(io::Error::new(
                        ErrorKind::BrokenPipe,
                        "delta stream reader is gone",
                    ))
                }
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct PipeReader<'a> {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
    scope: &'a CancelScope,
}

impl Read for PipeReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.current.len() {
            if self.scope.is_cancelled() {
                return Err(cancelled());
            }
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                // a writer that went away because of cancellation is not a
                // clean end of stream
                Err(RecvTimeoutError::Disconnected) if self.scope.is_cancelled() => {
                    return Err(cancelled())
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = (self.current.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
