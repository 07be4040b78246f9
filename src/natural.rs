//! Natural run distribution (phase 1).

use log;

use crate::bucket::Bucket;
use crate::key::key_of;
use crate::reader::LineReader;
use crate::sort::SortError;
use crate::writer::LineWriter;

/// Splits the input at key descents and deals the resulting runs
/// round-robin across the bucket.
///
/// `last_key` starts above every real key, so the first record opens a new
/// run. Consecutive runs land on consecutive files; per-file buffering is
/// the writers' flush threshold. Empty lines are skipped, empty input
/// leaves every file empty. Returns the number of runs distributed.
pub fn distribute_natural_runs(
    input: &mut LineReader,
    bucket: &mut Bucket,
    write_buf_size: usize,
) -> Result<usize, SortError> {
    let mut writers = Vec::with_capacity(bucket.len());
    for file in bucket.files_mut() {
        writers.push(file.writer(write_buf_size)?);
    }

    let mut series_count: usize = 0;
    let mut last_key = i64::MAX;

    while let Some(line) = input.next_line()? {
        if line.is_empty() {
            continue;
        }
        let key = match key_of(line) {
            Ok(key) => key,
            Err(err) => {
                flush_all(&mut writers);
                return Err(err);
            }
        };

        if key < last_key {
            series_count += 1;
        }
        last_key = key;

        let index = series_count % writers.len();
        if let Err(err) = writers[index].write_line(line) {
            flush_all(&mut writers);
            return Err(err.into());
        }
    }

    for writer in &mut writers {
        writer.flush()?;
    }
    drop(writers);
    bucket.reset_cursors()?;

    log::debug!("natural run distribution produced {} runs", series_count);
    Ok(series_count)
}

fn flush_all(writers: &mut [LineWriter]) {
    for writer in writers {
        writer.flush_on_error();
    }
}
