//! Replacement-selection run generation (phase 1).

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::mem;

use log;

use crate::bucket::Bucket;
use crate::key::key_of;
use crate::merger::Record;
use crate::reader::LineReader;
use crate::sort::SortError;

/// Fixed accounting overhead per record on top of the line's capacity.
pub(crate) const RECORD_OVERHEAD: usize = mem::size_of::<Record>();

struct HeapRecord(Record);

impl PartialEq for HeapRecord {
    fn eq(&self, other: &Self) -> bool {
        self.0.key == other.0.key
    }
}

impl Eq for HeapRecord {}

impl PartialOrd for HeapRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapRecord {
    // Equal keys may come out in any order; the sort is not stable.
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.key.cmp(&other.0.key)
    }
}

fn record_cost(record: &Record) -> usize {
    record.line.capacity() + RECORD_OVERHEAD
}

/// Generates long runs with a bounded record heap and deals them
/// round-robin across the bucket.
///
/// Records whose key fits the current run feed the heap, out-of-order
/// arrivals wait in a deferred batch that seeds the next run. Both sides
/// count toward the budget, so in-memory residency never exceeds
/// `memory_limit` by more than one record. Returns the number of runs
/// written.
pub fn distribute_long_runs(
    input: &mut LineReader,
    bucket: &mut Bucket,
    memory_limit: usize,
    write_buf_size: usize,
) -> Result<usize, SortError> {
    let mut heap: BinaryHeap<Reverse<HeapRecord>> = BinaryHeap::new();
    let mut deferred: Vec<Record> = Vec::new();
    let mut in_memory = 0usize;

    // Prime the heap up to the budget; a budget below one record still
    // admits a single one so the input always drains.
    while in_memory < memory_limit || heap.is_empty() {
        match read_record(input)? {
            Some(record) => {
                in_memory += record_cost(&record);
                heap.push(Reverse(HeapRecord(record)));
            }
            None => break,
        }
    }

    let mut runs = 0usize;
    while !heap.is_empty() {
        let file_index = runs % bucket.len();
        let mut writer = bucket.get_mut(file_index).writer(write_buf_size)?;
        let mut last_key = i64::MIN;

        while let Some(Reverse(HeapRecord(record))) = heap.pop() {
            if let Err(err) = writer.write_line(&record.line) {
                writer.flush_on_error();
                return Err(err.into());
            }
            in_memory -= record_cost(&record);
            last_key = record.key;
            drop(record);

            // Each emitted record frees room for exactly one replacement.
            match read_record(input) {
                Ok(Some(next)) => {
                    in_memory += record_cost(&next);
                    if next.key >= last_key {
                        heap.push(Reverse(HeapRecord(next)));
                    } else {
                        deferred.push(next);
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
        drop(writer);
        runs += 1;

        heap.extend(deferred.drain(..).map(|record| Reverse(HeapRecord(record))));
    }

    bucket.reset_cursors()?;
    log::debug!("replacement selection produced {} runs", runs);
    Ok(runs)
}

fn read_record(input: &mut LineReader) -> Result<Option<Record>, SortError> {
    while let Some(line) = input.next_line()? {
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
