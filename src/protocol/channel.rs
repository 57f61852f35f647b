//! Line-delimited JSON channels.

use crate::error::{BridgeError, Result};
use crate::protocol::messages::Status;
use serde::Serialize;
use std::io::{BufRead, Write};

/// Writes one JSON object per line and flushes after each.
pub struct JsonLineWriter<W: Write> {
    writer: W,
}

impl<W: Write> JsonLineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize `message` as a single line and flush.
    pub fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Status stream with verbosity-gated diagnostics.
///
/// Diagnostics are written as `{"status":"log"}` lines so the stream stays
/// parseable as JSON lines.
pub struct StatusReporter<W: Write> {
    channel: JsonLineWriter<W>,
    verbosity: u8,
}

impl<W: Write> StatusReporter<W> {
    pub fn new(writer: W, verbosity: u8) -> Self {
        Self {
            channel: JsonLineWriter::new(writer),
            verbosity,
        }
    }

    /// Write a status message.
    pub fn status(&mut self, status: &Status) -> Result<()> {
        self.channel.send(status)
    }

    /// Report an error with its cause chain.
    pub fn error(&mut self, error: &BridgeError) -> Result<()> {
        self.channel.send(&Status::from_error(error))
    }

    /// Write a diagnostic line when running with `-v`.
    pub fn log(&mut self, message: impl FnOnce() -> String) -> Result<()> {
        if self.verbosity == 0 {
            return Ok(());
        }
        self.channel.send(&Status::Log { message: message() })
    }

    pub fn into_inner(self) -> W {
        self.channel.into_inner()
    }
}

/// Reads request lines until end of input.
pub struct LineReader<R: BufRead> {
    reader: R,
    raw: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            raw: Vec::new(),
        }
    }

    /// Next raw line without its terminator, or `None` at end of input.
    ///
    /// Lines that are not valid UTF-8 are returned lossily converted so the
    /// caller can report them as malformed instead of aborting.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        self.raw.clear();
        if self.reader.read_until(b'\n', &mut self.raw)? == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.raw);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}
