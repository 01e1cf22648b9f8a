//! The worker's two halves of the host connection.
//!
//! Turn input and tool responses share one inbound stream, so a single
//! reader thread owns stdin and every consumer pulls from its queue.

use crate::{ChannelError, END_OF_TOOL_OUTPUT};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Inbound lines from the host.
#[derive(Debug)]
pub struct HostLines {
    rx: Mutex<Receiver<io::Result<String>>>,
    /// Responses still owed by the host for commands that timed out.
    stale: Mutex<usize>,
    /// A line read while discarding stale responses that belongs to a turn.
    held: Mutex<Option<String>>,
}

impl HostLines {
    pub fn stdin() -> Arc<Self> {
        Self::spawn(io::BufReader::new(io::stdin()))
    }

    /// Start a reader thread over `reader`. The thread ends at EOF, on a
    /// read error, or when the returned handle is dropped.
    ///
    /// A line that is not valid UTF-8 is delivered as an `InvalidData` error
    /// for that line only; reading continues with the next one.
    pub fn spawn<R>(mut reader: R) -> Arc<Self>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(decode_line(&mut buf)).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });
        Arc::new(Self {
            rx: Mutex::new(rx),
            stale: Mutex::new(0),
            held: Mutex::new(None),
        })
    }

    /// Next line, waiting until `deadline` if one is given. `Ok(None)` is EOF.
    pub fn next_line(&self, deadline: Option<Instant>) -> Result<Option<String>, ChannelError> {
        if let Some(line) = self.held.lock().ok().and_then(|mut held| held.take()) {
            return Ok(Some(line));
        }
        let rx = self
            .rx
            .lock()
            .map_err(|_| ChannelError::Io(io::Error::other("host line queue poisoned")))?;
        let received = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(remaining) {
                    Ok(line) => Some(line),
                    Err(RecvTimeoutError::Timeout) => return Err(ChannelError::Timeout),
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            }
            None => rx.recv().ok(),
        };
        match received {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(e)) => Err(ChannelError::Io(e)),
            None => Ok(None),
        }
    }

    /// Next turn line. Skips blank lines, stray sentinels and responses that
    /// arrived after their command timed out.
    pub fn next_turn_line(&self) -> Result<Option<String>, ChannelError> {
        self.skip_stale(None)?;
        loop {
            let Some(line) = self.next_line(None)? else {
                return Ok(None);
            };
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed == END_OF_TOOL_OUTPUT {
                continue;
            }
            return Ok(Some(line));
        }
    }

    /// Record that the host still owes a response we stopped waiting for.
    pub fn mark_stale(&self) {
        if let Ok(mut stale) = self.stale.lock() {
            *stale += 1;
        }
    }

    pub fn stale_responses(&self) -> usize {
        self.stale.lock().map(|s| *s).unwrap_or(0)
    }

    /// Consume late responses, each up to and including its sentinel.
    ///
    /// A turn payload means the host has moved on without answering: the
    /// debt is dropped and the line is kept for the next reader.
    pub(crate) fn skip_stale(&self, deadline: Option<Instant>) -> Result<(), ChannelError> {
        while self.stale_responses() > 0 {
            let Some(line) = self.next_line(deadline)? else {
                return Ok(());
            };
            if is_turn_payload(&line) {
                tracing::warn!(
                    owed = self.stale_responses(),
                    "host skipped late responses; resuming with the next turn"
                );
                if let Ok(mut stale) = self.stale.lock() {
                    *stale = 0;
                }
                if let Ok(mut held) = self.held.lock() {
                    *held = Some(line);
                }
                return Ok(());
            }
            if line.trim() == END_OF_TOOL_OUTPUT
                && let Ok(mut stale) = self.stale.lock()
            {
                *stale = stale.saturating_sub(1);
                tracing::debug!(remaining = *stale, "discarded late host response");
            }
        }
        Ok(())
    }
}

/// Strip the line terminator and check the encoding.
fn decode_line(buf: &mut Vec<u8>) -> io::Result<String> {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    String::from_utf8(std::mem::take(buf)).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("input line is not valid UTF-8: {e}"),
        )
    })
}

/// Turn input is a JSON array of turns or an emitted `{"messages": ...}`
/// state; tool responses are neither.
fn is_turn_payload(line: &str) -> bool {
    match serde_json::from_str::<Value>(line.trim()) {
        Ok(Value::Array(_)) => true,
        Ok(Value::Object(map)) => map.contains_key("messages"),
        _ => false,
    }
}

/// Outbound line writer. Cloning shares the same underlying stream.
#[derive(Clone)]
pub struct HostWriter {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl std::fmt::Debug for HostWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostWriter").finish_non_exhaustive()
    }
}

impl HostWriter {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }

    /// Write one line and flush it so the host sees it immediately.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::other("host writer poisoned"))?;
        writeln!(out, "{line}")?;
        out.flush()
    }
}

/// Convert an optional timeout into an absolute deadline.
pub(crate) fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.map(|t| Instant::now() + t)
}
