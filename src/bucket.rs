//! Temporary file pool.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::reader::LineReader;
use crate::sort::SortError;
use crate::writer::LineWriter;

/// A temporary file owned by a bucket.
///
/// Holds the path and an open handle for the pool operations. Readers and
/// writers are handed out as fresh handles keyed by the path: `reader`
/// borrows the file shared, `writer` exclusively, so a file cannot be
/// truncated or swapped away while a handle is being created.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    file: fs::File,
}

impl TempFile {
    /// Creates the file at `path`, truncating whatever a previous run left.
    pub fn create(path: PathBuf) -> Result<Self, SortError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(TempFile { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncates to zero bytes and rewinds the cursor.
    pub fn clear(&mut self) -> Result<(), SortError> {
        self.file.set_len(0)?;
        self.reset_cursor()
    }

    /// Rewinds the owned handle's cursor to the start of the file.
    pub fn reset_cursor(&mut self) -> Result<(), SortError> {
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    /// Current size in bytes.
    pub fn size(&self) -> Result<u64, SortError> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, SortError> {
        Ok(self.size()? == 0)
    }

    /// Removes the file from the filesystem.
    pub fn remove(self) -> Result<(), SortError> {
        drop(self.file);
        fs::remove_file(&self.path)?;
        Ok(())
    }

    /// Opens a fresh reader positioned at the start of the file.
    pub fn reader(&self, buf_size: usize) -> Result<LineReader, SortError> {
        LineReader::with_buf_size(&self.path, buf_size)
    }

    /// Opens a fresh writer appending to the file.
    pub fn writer(&mut self, buf_size: usize) -> Result<LineWriter, SortError> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(LineWriter::new(file, buf_size))
    }
}

/// A fixed-size ordered pool of temp files playing the source or the
/// destination role of a merge pass.
#[derive(Debug)]
pub struct Bucket {
    files: Vec<TempFile>,
}

impl Bucket {
    /// Creates `size` files named `<prefix><index>` under `dir`.
    pub fn create(dir: &Path, prefix: &str, size: usize) -> Result<Self, SortError> {
        let mut files = Vec::with_capacity(size);
        for index in 0..size {
            files.push(TempFile::create(dir.join(format!("{}{}", prefix, index)))?);
        }
        Ok(Bucket { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[TempFile] {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut [TempFile] {
        &mut self.files
    }

    pub fn get_mut(&mut self, index: usize) -> &mut TempFile {
        &mut self.files[index]
    }

    /// Truncates every file in the bucket.
    pub fn clear_all(&mut self) -> Result<(), SortError> {
        for file in &mut self.files {
            file.clear()?;
        }
        Ok(())
    }

    /// Rewinds every file's cursor.
    pub fn reset_cursors(&mut self) -> Result<(), SortError> {
        for file in &mut self.files {
            file.reset_cursor()?;
        }
        Ok(())
    }

    /// Number of files currently holding data.
    pub fn non_empty_count(&self) -> Result<usize, SortError> {
        let mut count = 0;
        for file in &self.files {
            if !file.is_empty()? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Index of the first non-empty file, if any.
    pub fn first_non_empty(&self) -> Result<Option<usize>, SortError> {
        for (index, file) in self.files.iter().enumerate() {
            if !file.is_empty()? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Consumes the bucket, removing every file except `keep`.
    pub fn remove_all_except(self, keep: Option<usize>) -> Result<(), SortError> {
        for (index, file) in self.files.into_iter().enumerate() {
            if Some(index) != keep {
                file.remove()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::*;

    use super::{Bucket, TempFile};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    fn test_bucket_naming(tmp_dir: tempfile::TempDir) {
        let bucket = Bucket::create(tmp_dir.path(), "b", 3).unwrap();

        assert_eq!(bucket.len(), 3);
        for index in 0..3 {
            let path = tmp_dir.path().join(format!("b{}", index));
            assert!(path.exists());
            assert_eq!(bucket.files()[index].path(), path);
        }
    }

    #[rstest]
    fn test_create_truncates_previous_content(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("b0");
        fs::write(&path, "1-leftover\n").unwrap();

        let file = TempFile::create(path).unwrap();
        assert!(file.is_empty().unwrap());
    }

    #[rstest]
    fn test_write_clear_cycle(tmp_dir: tempfile::TempDir) {
        let mut file = TempFile::create(tmp_dir.path().join("b0")).unwrap();

        let mut writer = file.writer(1024).unwrap();
        writer.write_line("3-abc").unwrap();
        writer.flush().unwrap();
        drop(writer);

        assert_eq!(file.size().unwrap(), 6);
        assert!(!file.is_empty().unwrap());

        file.clear().unwrap();
        assert!(file.is_empty().unwrap());
    }

    #[rstest]
    fn test_writers_append(tmp_dir: tempfile::TempDir) {
        let mut file = TempFile::create(tmp_dir.path().join("b0")).unwrap();

        for line in ["1-a", "2-b"] {
            let mut writer = file.writer(1024).unwrap();
            writer.write_line(line).unwrap();
            writer.flush().unwrap();
        }

        let mut reader = file.reader(1024).unwrap();
        assert_eq!(reader.next_line().unwrap(), Some("1-a"));
        assert_eq!(reader.next_line().unwrap(), Some("2-b"));
        assert_eq!(reader.next_line().unwrap(), None);
    }

    #[rstest]
    fn test_remove_all_except(tmp_dir: tempfile::TempDir) {
        let mut bucket = Bucket::create(tmp_dir.path(), "c", 3).unwrap();

        let mut writer = bucket.get_mut(1).writer(1024).unwrap();
        writer.write_line("8-keep").unwrap();
        writer.flush().unwrap();
        drop(writer);

        assert_eq!(bucket.non_empty_count().unwrap(), 1);
        assert_eq!(bucket.first_non_empty().unwrap(), Some(1));

        bucket.remove_all_except(Some(1)).unwrap();
        assert!(!tmp_dir.path().join("c0").exists());
        assert!(tmp_dir.path().join("c1").exists());
        assert!(!tmp_dir.path().join("c2").exists());
    }
}
