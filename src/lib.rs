//! `polysort` is a polyphase external sorter for keyed text lines.
//!
//! External sorting is required when the data being sorted does not fit into the main memory (RAM)
//! of a computer and instead must reside in slower external memory, usually a hard disk drive.
//! Each input line carries a leading signed integer key; sorting happens in two phases. During the
//! first phase the input is streamed once and split into sorted runs dealt across a fixed pool of
//! temporary files. During the second phase the runs are k-way merged between two file buckets
//! whose roles ping-pong each pass until a single file holds one sorted run.
//! For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `polysort` supports the following features:
//!
//! * **Natural run generation:**
//!   the input is split at key descents and the resulting runs are dealt round-robin.
//! * **Replacement selection:**
//!   a bounded in-memory heap stretches runs to roughly twice the memory budget,
//!   reducing the number of merge passes.
//! * **Parallel merging:**
//!   independent merge groups of a pass can run on a worker pool, one destination
//!   file per worker.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use env_logger;
//! use log;
//!
//! use polysort::{ExternalSorterBuilder, Strategy};
//!
//! fn main() {
//!     env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();
//!
//!     let sorter = ExternalSorterBuilder::new()
//!         .with_dir(Path::new("./"))
//!         .with_strategy(Strategy::ReplacementSelection)
//!         .with_memory_limit(480 * 1024 * 1024)
//!         .build()
//!         .unwrap();
//!
//!     let outcome = sorter.sort(Path::new("input.txt")).unwrap();
//!     println!("sorted data left in {}", outcome.path.display());
//! }
//! ```

pub mod bucket;
pub mod key;
pub mod merger;
pub mod natural;
mod parallel;
pub mod reader;
pub mod replacement;
pub mod sort;
pub mod writer;

pub use bucket::{Bucket, TempFile};
pub use key::key_of;
pub use merger::{merge_one_run, Record, RunReader};
pub use natural::distribute_natural_runs;
pub use reader::LineReader;
pub use replacement::distribute_long_runs;
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortOutcome, Strategy};
pub use writer::LineWriter;
