//! Buffered line reading.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use memchr::memchr;

use crate::sort::SortError;

/// Buffered line reader over a file.
///
/// Yields lines one at a time without their terminator, normalizing `\r\n`
/// endings and returning an unterminated trailing line as the final one.
/// A view returned by [`next_line`](LineReader::next_line) stays valid until
/// the next call on the same reader: lines that fit the internal buffer are
/// handed out as views into it, lines crossing a buffer refill are
/// reassembled in a private scratch buffer first.
pub struct LineReader {
    file: fs::File,
    buf: Vec<u8>,
    pos: usize,
    end: usize,
    eof: bool,
    scratch: Vec<u8>,
}

impl LineReader {
    /// Default internal buffer size.
    pub const DEFAULT_BUF_SIZE: usize = 64 * 1024;

    /// Opens `path` for reading with the default buffer size.
    pub fn open(path: &Path) -> Result<Self, SortError> {
        Self::with_buf_size(path, Self::DEFAULT_BUF_SIZE)
    }

    /// Opens `path` for reading with an explicit buffer size.
    pub fn with_buf_size(path: &Path, buf_size: usize) -> Result<Self, SortError> {
        let file = fs::File::open(path)?;
        Ok(Self::from_file(file, buf_size))
    }

    pub(crate) fn from_file(file: fs::File, buf_size: usize) -> Self {
        LineReader {
            file,
            buf: vec![0; buf_size.max(1)],
            pos: 0,
            end: 0,
            eof: false,
            scratch: Vec::new(),
        }
    }

    /// True once the file is exhausted and the internal buffer is drained.
    pub fn is_end(&self) -> bool {
        self.eof && self.pos >= self.end
    }

    /// Returns the next line, or `None` at end of input.
    ///
    /// Empty lines are returned as empty views; skipping them is the
    /// caller's business. EOF is not an error.
    pub fn next_line(&mut self) -> Result<Option<&str>, SortError> {
        self.scratch.clear();

        loop {
            if self.pos < self.end {
                if let Some(offset) = memchr(b'\n', &self.buf[self.pos..self.end]) {
                    let start = self.pos;
                    self.pos += offset + 1;
                    if self.scratch.is_empty() {
                        return as_line(&self.buf[start..start + offset]).map(Some);
                    }
                    self.scratch.extend_from_slice(&self.buf[start..start + offset]);
                    return as_line(&self.scratch).map(Some);
                }
                self.scratch.extend_from_slice(&self.buf[self.pos..self.end]);
                self.pos = self.end;
            }

            if self.eof {
                if self.scratch.is_empty() {
                    return Ok(None);
                }
                // Trailing line without a terminator.
                return as_line(&self.scratch).map(Some);
            }

            self.fill_buf()?;
        }
    }

    fn fill_buf(&mut self) -> Result<(), SortError> {
        let read = self.file.read(&mut self.buf)?;
        self.pos = 0;
        self.end = read;
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }
}

fn as_line(bytes: &[u8]) -> Result<&str, SortError> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    std::str::from_utf8(bytes)
        .map_err(|err| SortError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::PathBuf;

    use rstest::*;

    use super::LineReader;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn write_input(dir: &tempfile::TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("input.txt");
        fs::write(&path, content).unwrap();
        path
    }

    fn read_all(reader: &mut LineReader) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().unwrap() {
            lines.push(line.to_string());
        }
        lines
    }

    #[rstest]
    #[case("1-a\n2-b\n3-c\n", vec!["1-a", "2-b", "3-c"])]
    #[case("1-a\r\n2-b\r\n", vec!["1-a", "2-b"])]
    #[case("1-a\n2-b", vec!["1-a", "2-b"])]
    #[case("1-a\n\n\n2-b\n", vec!["1-a", "", "", "2-b"])]
    #[case("", vec![])]
    #[case("\n", vec![""])]
    fn test_line_iteration(
        tmp_dir: tempfile::TempDir,
        #[case] content: &str,
        #[case] expected: Vec<&str>,
    ) {
        let path = write_input(&tmp_dir, content);
        let mut reader = LineReader::open(&path).unwrap();
        assert_eq!(read_all(&mut reader), expected);
        assert!(reader.is_end());
    }

    #[rstest]
    fn test_lines_spanning_refills(tmp_dir: tempfile::TempDir) {
        let long_line = "7-".to_string() + &"x".repeat(100);
        let content = format!("1-a\n{}\n2-b\n", long_line);
        let path = write_input(&tmp_dir, &content);

        // A buffer far smaller than the long line forces scratch reassembly.
        let mut reader = LineReader::with_buf_size(&path, 8).unwrap();
        assert_eq!(read_all(&mut reader), vec!["1-a".to_string(), long_line, "2-b".to_string()]);
    }

    #[rstest]
    fn test_newline_at_buffer_boundary(tmp_dir: tempfile::TempDir) {
        let path = write_input(&tmp_dir, "1234567\n8-b\n");
        let mut reader = LineReader::with_buf_size(&path, 8).unwrap();

        assert_eq!(read_all(&mut reader), vec!["1234567", "8-b"]);
    }

    #[rstest]
    fn test_view_valid_until_next_call(tmp_dir: tempfile::TempDir) {
        let path = write_input(&tmp_dir, "10-first\n20-second\n");
        let mut reader = LineReader::open(&path).unwrap();

        let first = reader.next_line().unwrap().unwrap().to_string();
        let second = reader.next_line().unwrap().unwrap().to_string();
        assert_eq!(first, "10-first");
        assert_eq!(second, "20-second");
        assert_eq!(reader.next_line().unwrap(), None);
    }
}
