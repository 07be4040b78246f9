//! Single-group k-way run merging.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::key::key_of;
use crate::reader::LineReader;
use crate::sort::SortError;
use crate::writer::LineWriter;

/// A record pulled from a reader: the parsed key plus the raw line.
#[derive(Debug)]
pub struct Record {
    pub key: i64,
    pub line: String,
}

/// A line reader with a one-record lookahead.
///
/// When a merge finds that a reader's next key breaks the current run, the
/// record is parked here so the following merge on the same group consumes
/// it as the head of its next run.
pub struct RunReader {
    reader: LineReader,
    head: Option<Record>,
}

impl RunReader {
    pub fn new(reader: LineReader) -> Self {
        RunReader { reader, head: None }
    }

    /// Takes the parked record or reads the next non-empty line.
    pub fn next_record(&mut self) -> Result<Option<Record>, SortError> {
        if let Some(record) = self.head.take() {
            return Ok(Some(record));
        }
        while let Some(line) = self.reader.next_line()? {
            if line.is_empty() {
                continue;
            }
            let key = key_of(line)?;
            return Ok(Some(Record {
                key,
                line: line.to_string(),
            }));
        }
        Ok(None)
    }

    /// Parks `record` as the next head.
    pub fn put_back(&mut self, record: Record) {
        debug_assert!(self.head.is_none());
        self.head = Some(record);
    }

    /// True while the reader may still produce a record.
    pub fn has_data(&self) -> bool {
        self.head.is_some() || !self.reader.is_end()
    }
}

struct HeapEntry {
    key: i64,
    reader: usize,
    line: String,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        (self.key, self.reader) == (other.key, other.reader)
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // The reader-index tie-break keeps merge output deterministic.
    fn cmp(&self, other: &Self) -> Ordering {
        (self.key, self.reader).cmp(&(other.key, other.reader))
    }
}

/// Merges exactly one run from `readers` into `writer`.
///
/// Every reader holding data contributes its current run head. A reader
/// whose next key falls below the last written key keeps that record parked
/// for a later merge; the emitted sequence is therefore one non-decreasing
/// run, and its multiset equals what was consumed from the readers.
/// Returns the number of records written.
pub fn merge_one_run(readers: &mut [RunReader], writer: &mut LineWriter) -> Result<usize, SortError> {
    // binary heap is max-heap by default so we reverse it to convert it to min-heap
    let mut heap = BinaryHeap::with_capacity(readers.len());

    for (index, reader) in readers.iter_mut().enumerate() {
        match reader.next_record() {
            Ok(Some(record)) => heap.push(Reverse(HeapEntry {
                key: record.key,
                reader: index,
                line: record.line,
            })),
            Ok(None) => {}
            Err(err) => {
                writer.flush_on_error();
                return Err(err);
            }
        }
    }

    let mut written = 0;
    let mut last_key = i64::MIN;

    while let Some(Reverse(entry)) = heap.pop() {
        if let Err(err) = writer.write_line(&entry.line) {
            writer.flush_on_error();
            return Err(err.into());
        }
        written += 1;
        last_key = entry.key;

        match readers[entry.reader].next_record() {
            Ok(Some(record)) => {
                if record.key >= last_key {
                    heap.push(Reverse(HeapEntry {
                        key: record.key,
                        reader: entry.reader,
                        line: record.line,
                    }));
                } else {
                    readers[entry.reader].put_back(record);
                }
            }
            Ok(None) => {}
            Err(err) => {
                writer.flush_on_error();
                return Err(err);
            }
        }
    }

    writer.flush()?;
    Ok(written)
}
