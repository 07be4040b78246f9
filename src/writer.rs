//! Buffered line writing.

use std::fs;
use std::io::{self, Write};

use log;

/// Buffered line writer.
///
/// Appends exactly one `\n` per line and batches output in an internal
/// buffer that is flushed on a size threshold, on an explicit
/// [`flush`](LineWriter::flush) and on drop. Partial writes from the OS are
/// retried here and nowhere above.
pub struct LineWriter {
    file: fs::File,
    buf: Vec<u8>,
    threshold: usize,
}

impl LineWriter {
    /// Default flush threshold.
    pub const DEFAULT_BUF_SIZE: usize = 64 * 1024;

    pub(crate) fn new(file: fs::File, threshold: usize) -> Self {
        let threshold = threshold.max(1);
        LineWriter {
            file,
            buf: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Appends one line plus its terminator.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.buf.extend_from_slice(line.as_bytes());
        self.buf.push(b'\n');
        if self.buf.len() >= self.threshold {
            self.flush_buf()?;
        }
        Ok(())
    }

    /// Flushes buffered data to the file. Idempotent.
    pub fn flush(&mut self) -> io::Result<()> {
        self.flush_buf()?;
        self.file.flush()
    }

    /// Best-effort flush for error paths where the original failure is the
    /// one worth reporting.
    pub(crate) fn flush_on_error(&mut self) {
        if let Err(err) = self.flush() {
            log::warn!("flush on error path failed: {}", err);
        }
    }

    fn flush_buf(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.file.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            log::warn!("line writer flush on drop failed: {}", err);
        }
    }
}
