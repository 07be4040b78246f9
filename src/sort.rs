//! External sorter: merge pass driver and polyphase controller.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;

use log;

use crate::bucket::Bucket;
use crate::merger::{merge_one_run, RunReader};
use crate::natural::distribute_natural_runs;
use crate::parallel;
use crate::reader::LineReader;
use crate::replacement::distribute_long_runs;
use crate::writer::LineWriter;

/// Default number of temp files per bucket.
pub const DEFAULT_BUCKET_SIZE: usize = 3;

/// Default phase-1 memory budget for replacement selection.
pub const DEFAULT_MEMORY_LIMIT: usize = 480 * 1024 * 1024;

/// File name prefix of the initial source bucket.
pub const SOURCE_PREFIX: &str = "b";

/// File name prefix of the initial destination bucket.
pub const DEST_PREFIX: &str = "c";

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Underlying file system failure.
    Io(io::Error),
    /// A line yielded no integer key; carries the offending line.
    MalformedRecord(String),
    /// The bucket is too small for phase 1 to rotate runs through it.
    OutOfTempFiles { bucket_size: usize },
    /// An internal consistency check failed.
    InvariantViolation(String),
    /// Workers thread pool initialization error.
    ThreadPoolBuild(rayon::ThreadPoolBuildError),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::Io(err) => Some(err),
            SortError::ThreadPoolBuild(err) => Some(err),
            SortError::MalformedRecord(_) => None,
            SortError::OutOfTempFiles { .. } => None,
            SortError::InvariantViolation(_) => None,
        }
    }
}

impl fmt::Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Io(err) => write!(f, "I/O operation failed: {}", err),
            SortError::MalformedRecord(line) => write!(f, "no integer key in record {:?}", line),
            SortError::OutOfTempFiles { bucket_size } => {
                write!(f, "bucket of {} file(s) cannot rotate runs", bucket_size)
            }
            SortError::InvariantViolation(what) => write!(f, "invariant violated: {}", what),
            SortError::ThreadPoolBuild(err) => {
                write!(f, "thread pool initialization failed: {}", err)
            }
        }
    }
}

impl From<io::Error> for SortError {
    fn from(err: io::Error) -> Self {
        SortError::Io(err)
    }
}

/// Phase-1 algorithm and merge scheduling variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Split the input at key descents into natural runs.
    Natural,
    /// Replacement selection under the memory budget.
    ReplacementSelection,
    /// Replacement selection plus parallel group merges.
    ParallelReplacementSelection,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder {
    /// Number of temp files per bucket.
    bucket_size: usize,
    /// Directory holding the bucket files; the process directory if unset.
    dir: Option<PathBuf>,
    /// Line reader buffer size.
    read_buf_size: usize,
    /// Line writer flush threshold.
    write_buf_size: usize,
    /// Phase-1 memory budget in bytes (replacement selection).
    memory_limit: usize,
    /// Run generation and merge scheduling variant.
    strategy: Strategy,
    /// Number of threads for parallel merging.
    threads_number: Option<usize>,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        if self.bucket_size < 2 {
            return Err(SortError::OutOfTempFiles {
                bucket_size: self.bucket_size,
            });
        }

        let thread_pool = match self.strategy {
            Strategy::ParallelReplacementSelection => {
                Some(Self::init_thread_pool(self.threads_number)?)
            }
            Strategy::Natural | Strategy::ReplacementSelection => None,
        };

        return Ok(ExternalSorter {
            bucket_size: self.bucket_size,
            dir: self.dir,
            read_buf_size: self.read_buf_size,
            write_buf_size: self.write_buf_size,
            memory_limit: self.memory_limit,
            strategy: self.strategy,
            thread_pool,
        });
    }

    /// Sets the number of temp files per bucket.
    pub fn with_bucket_size(mut self, bucket_size: usize) -> ExternalSorterBuilder {
        self.bucket_size = bucket_size;
        return self;
    }

    /// Sets the directory the bucket files are created in.
    pub fn with_dir(mut self, dir: &Path) -> ExternalSorterBuilder {
        self.dir = Some(dir.to_path_buf());
        return self;
    }

    /// Sets the line reader buffer size.
    pub fn with_read_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.read_buf_size = buf_size;
        return self;
    }

    /// Sets the line writer flush threshold.
    pub fn with_write_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.write_buf_size = buf_size;
        return self;
    }

    /// Sets the phase-1 memory budget for replacement selection.
    pub fn with_memory_limit(mut self, memory_limit: usize) -> ExternalSorterBuilder {
        self.memory_limit = memory_limit;
        return self;
    }

    /// Sets the run generation variant.
    pub fn with_strategy(mut self, strategy: Strategy) -> ExternalSorterBuilder {
        self.strategy = strategy;
        return self;
    }

    /// Sets the number of threads used by the parallel variant.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let threads = threads_number.unwrap_or_else(|| {
            let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
            (cores - 1).max(1)
        });

        log::info!("initializing thread-pool (threads: {})", threads);
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(SortError::ThreadPoolBuild)?;

        return Ok(thread_pool);
    }
}

impl Default for ExternalSorterBuilder {
    fn default() -> Self {
        ExternalSorterBuilder {
            bucket_size: DEFAULT_BUCKET_SIZE,
            dir: None,
            read_buf_size: LineReader::DEFAULT_BUF_SIZE,
            write_buf_size: LineWriter::DEFAULT_BUF_SIZE,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            strategy: Strategy::ReplacementSelection,
            threads_number: None,
        }
    }
}

/// Result of a finished sort.
#[derive(Debug)]
pub struct SortOutcome {
    /// Temp file holding the sorted data.
    pub path: PathBuf,
    /// Runs produced by phase 1.
    pub initial_runs: usize,
    /// Merge passes performed by phase 2.
    pub passes: usize,
}

/// Polyphase external sorter.
///
/// Phase 1 streams the input once and deals sorted runs across the source
/// bucket. Phase 2 repeatedly merges every source run into the destination
/// bucket and swaps the bucket roles until at most one non-empty file
/// remains; that file then holds a single sorted run.
pub struct ExternalSorter {
    bucket_size: usize,
    dir: Option<PathBuf>,
    read_buf_size: usize,
    write_buf_size: usize,
    memory_limit: usize,
    strategy: Strategy,
    thread_pool: Option<rayon::ThreadPool>,
}

impl ExternalSorter {
    /// Sorts `input` and reports the temp file holding the result.
    ///
    /// Bucket files `b0..` and `c0..` are created in the configured
    /// directory and truncated between passes; on success every file except
    /// the winning one is removed.
    pub fn sort(&self, input: &Path) -> Result<SortOutcome, SortError> {
        let dir = self.dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let mut source = Bucket::create(&dir, SOURCE_PREFIX, self.bucket_size)?;
        let mut dest = Bucket::create(&dir, DEST_PREFIX, self.bucket_size)?;

        let mut input = LineReader::with_buf_size(input, self.read_buf_size)?;
        let initial_runs = match self.strategy {
            Strategy::Natural => {
                distribute_natural_runs(&mut input, &mut source, self.write_buf_size)?
            }
            Strategy::ReplacementSelection | Strategy::ParallelReplacementSelection => {
                distribute_long_runs(&mut input, &mut source, self.memory_limit, self.write_buf_size)?
            }
        };
        drop(input);
        log::info!("phase 1 done ({} initial runs)", initial_runs);

        let mut passes = 0;
        let mut prev_runs = initial_runs;
        loop {
            if source.non_empty_count()? <= 1 {
                break;
            }

            let stats = match &self.thread_pool {
                Some(pool) => parallel::merge_pass_parallel(
                    pool,
                    &source,
                    &mut dest,
                    self.read_buf_size,
                    self.write_buf_size,
                )?,
                None => merge_pass(&source, &mut dest, self.read_buf_size, self.write_buf_size)?,
            };
            passes += 1;
            log::debug!("pass {}: {} runs -> {} runs", passes, prev_runs, stats.runs);

            if cfg!(debug_assertions) && prev_runs > 1 && stats.runs >= prev_runs {
                return Err(SortError::InvariantViolation(format!(
                    "merge pass did not reduce run count ({} -> {})",
                    prev_runs, stats.runs
                )));
            }
            prev_runs = stats.runs;

            source.clear_all()?;
            std::mem::swap(&mut source, &mut dest);
        }

        let winner = source.first_non_empty()?.unwrap_or(0);
        let path = source.files()[winner].path().to_path_buf();
        source.remove_all_except(Some(winner))?;
        dest.remove_all_except(None)?;

        log::info!("sorted data in {} after {} passes", path.display(), passes);
        return Ok(SortOutcome {
            path,
            initial_runs,
            passes,
        });
    }
}

/// Per-pass statistics.
pub(crate) struct PassStats {
    /// Runs emitted into the destination bucket.
    pub runs: usize,
}

/// Runs one full merge pass from `source` into `dest`.
///
/// Every non-empty source file contributes a reader; single-run merges go
/// to destination files round-robin until no reader has data left.
pub(crate) fn merge_pass(
    source: &Bucket,
    dest: &mut Bucket,
    read_buf_size: usize,
    write_buf_size: usize,
) -> Result<PassStats, SortError> {
    let mut readers = open_run_readers(source, read_buf_size)?;
    dest.clear_all()?;

    let runs = merge_rounds(&mut readers, dest, write_buf_size)?;

    dest.reset_cursors()?;
    Ok(PassStats { runs })
}

/// Merges one run at a time from `readers` into `dest` round-robin until
/// every reader is drained. Returns the number of runs emitted.
pub(crate) fn merge_rounds(
    readers: &mut [RunReader],
    dest: &mut Bucket,
    write_buf_size: usize,
) -> Result<usize, SortError> {
    let mut runs = 0;
    let mut output_index = 0;

    while readers.iter().any(RunReader::has_data) {
        let mut writer = dest.get_mut(output_index).writer(write_buf_size)?;
        let written = merge_one_run(readers, &mut writer)?;
        drop(writer);

        if written > 0 {
            runs += 1;
            output_index = (output_index + 1) % dest.len();
        }
    }

    Ok(runs)
}

/// Opens a run reader for every non-empty file in `bucket`.
pub(crate) fn open_run_readers(
    bucket: &Bucket,
    read_buf_size: usize,
) -> Result<Vec<RunReader>, SortError> {
    let mut readers = Vec::new();
    for file in bucket.files() {
        if !file.is_empty()? {
            readers.push(RunReader::new(file.reader(read_buf_size)?));
        }
    }
    Ok(readers)
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::Path;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rstest::*;

    use super::{merge_pass, ExternalSorter, ExternalSorterBuilder, SortError, Strategy};
    use crate::bucket::Bucket;
    use crate::key::key_of;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn keyed_lines(keys: &[i64]) -> String {
        keys.iter().map(|key| format!("{}-p\n", key)).collect()
    }

    fn seed_bucket(dir: &Path, prefix: &str, files: &[&[i64]]) -> Bucket {
        let bucket = Bucket::create(dir, prefix, files.len()).unwrap();
        for (index, keys) in files.iter().enumerate() {
            fs::write(bucket.files()[index].path(), keyed_lines(keys)).unwrap();
        }
        bucket
    }

    fn file_keys(path: &Path) -> Vec<i64> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| key_of(line).unwrap())
            .collect()
    }

    fn sorter(dir: &Path, strategy: Strategy) -> ExternalSorter {
        ExternalSorterBuilder::new()
            .with_dir(dir)
            .with_strategy(strategy)
            .with_memory_limit(256)
            .build()
            .unwrap()
    }

    #[rstest]
    fn test_merge_pass_distributes_runs_round_robin(tmp_dir: tempfile::TempDir) {
        let source = seed_bucket(
            tmp_dir.path(),
            "b",
            &[&[9, 2, 3, 7, 2], &[7, 5, 1, 10, 2], &[2, 9]],
        );
        let mut dest = Bucket::create(tmp_dir.path(), "c", 3).unwrap();

        let stats = merge_pass(&source, &mut dest, 1024, 1024).unwrap();

        assert_eq!(stats.runs, 4);
        assert_eq!(file_keys(dest.files()[0].path()), vec![2, 7, 9, 9, 2]);
        assert_eq!(file_keys(dest.files()[1].path()), vec![2, 3, 5, 7]);
        assert_eq!(file_keys(dest.files()[2].path()), vec![1, 2, 10]);
    }

    #[rstest]
    fn test_pass_sequence_reaches_single_run(tmp_dir: tempfile::TempDir) {
        let mut source = seed_bucket(
            tmp_dir.path(),
            "b",
            &[&[9, 2, 3, 7, 2], &[7, 5, 1, 10, 2], &[2, 9]],
        );
        let mut dest = Bucket::create(tmp_dir.path(), "c", 3).unwrap();

        let mut run_counts = Vec::new();
        while source.non_empty_count().unwrap() > 1 {
            let stats = merge_pass(&source, &mut dest, 1024, 1024).unwrap();
            run_counts.push(stats.runs);
            source.clear_all().unwrap();
            std::mem::swap(&mut source, &mut dest);
        }

        assert_eq!(run_counts, vec![4, 2, 1]);
        let winner = source.first_non_empty().unwrap().unwrap();
        assert_eq!(
            file_keys(source.files()[winner].path()),
            vec![1, 2, 2, 2, 2, 3, 5, 7, 7, 9, 9, 10]
        );
    }

    #[rstest]
    fn test_merge_pass_keeps_destination_count_bounded(tmp_dir: tempfile::TempDir) {
        // Ten runs spread over two files still land on only three outputs.
        let source = seed_bucket(
            tmp_dir.path(),
            "b",
            &[&[5, 4, 3, 2, 1], &[9, 8, 7, 6, 5], &[]],
        );
        let mut dest = Bucket::create(tmp_dir.path(), "c", 3).unwrap();

        let stats = merge_pass(&source, &mut dest, 1024, 1024).unwrap();

        assert!(stats.runs < 10);
        assert!(dest.non_empty_count().unwrap() <= 3);
    }

    #[rstest]
    #[case(Strategy::Natural)]
    #[case(Strategy::ReplacementSelection)]
    #[case(Strategy::ParallelReplacementSelection)]
    fn test_external_sorter(tmp_dir: tempfile::TempDir, #[case] strategy: Strategy) {
        let mut rng = StdRng::seed_from_u64(42);
        let mut lines: Vec<String> = (0..500)
            .map(|index| format!("{}-payload{}", rng.gen_range(-100..100), index))
            .collect();
        lines.shuffle(&mut rng);

        let input_path = tmp_dir.path().join("input.txt");
        fs::write(&input_path, lines.join("\n") + "\n").unwrap();

        let outcome = sorter(tmp_dir.path(), strategy).sort(&input_path).unwrap();

        let output = fs::read_to_string(&outcome.path).unwrap();
        let output_lines: Vec<&str> = output.lines().collect();

        // Multiset preservation.
        let mut expected = lines.clone();
        expected.sort();
        let mut actual: Vec<String> = output_lines.iter().map(|line| line.to_string()).collect();
        actual.sort();
        assert_eq!(actual, expected);

        // Sortedness.
        let keys: Vec<i64> = output_lines.iter().map(|line| key_of(line).unwrap()).collect();
        assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[rstest]
    fn test_parallel_merges_with_wide_bucket(tmp_dir: tempfile::TempDir) {
        // Six files per bucket keep enough readers alive for grouped merges.
        let mut rng = StdRng::seed_from_u64(3);
        let lines: Vec<String> = (0..800)
            .map(|index| format!("{}-row{}", rng.gen_range(0..50), index))
            .collect();

        let input_path = tmp_dir.path().join("input.txt");
        fs::write(&input_path, lines.join("\n") + "\n").unwrap();

        let sorter = ExternalSorterBuilder::new()
            .with_dir(tmp_dir.path())
            .with_strategy(Strategy::ParallelReplacementSelection)
            .with_bucket_size(6)
            .with_memory_limit(128)
            .with_threads_number(3)
            .build()
            .unwrap();

        let outcome = sorter.sort(&input_path).unwrap();

        let output = fs::read_to_string(&outcome.path).unwrap();
        let mut expected = lines.clone();
        expected.sort();
        let mut actual: Vec<String> = output.lines().map(|line| line.to_string()).collect();
        actual.sort();
        assert_eq!(actual, expected);

        let keys: Vec<i64> = output.lines().map(|line| key_of(line).unwrap()).collect();
        assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[rstest]
    fn test_sorting_sorted_input_is_identity(tmp_dir: tempfile::TempDir) {
        let content = keyed_lines(&[-7, -1, 0, 3, 5, 9, 12]);
        let input_path = tmp_dir.path().join("input.txt");
        fs::write(&input_path, &content).unwrap();

        let outcome = sorter(tmp_dir.path(), Strategy::ReplacementSelection)
            .sort(&input_path)
            .unwrap();

        assert_eq!(fs::read_to_string(&outcome.path).unwrap(), content);
    }

    #[rstest]
    fn test_empty_input_terminates_in_zero_passes(tmp_dir: tempfile::TempDir) {
        let input_path = tmp_dir.path().join("input.txt");
        fs::write(&input_path, "").unwrap();

        let outcome = sorter(tmp_dir.path(), Strategy::Natural).sort(&input_path).unwrap();

        assert_eq!(outcome.passes, 0);
        assert_eq!(outcome.initial_runs, 0);
        assert_eq!(fs::read_to_string(&outcome.path).unwrap(), "");
    }

    #[rstest]
    fn test_single_record_passes_through(tmp_dir: tempfile::TempDir) {
        let input_path = tmp_dir.path().join("input.txt");
        fs::write(&input_path, "5-only\n").unwrap();

        let outcome = sorter(tmp_dir.path(), Strategy::Natural).sort(&input_path).unwrap();

        assert_eq!(outcome.passes, 0);
        assert_eq!(fs::read_to_string(&outcome.path).unwrap(), "5-only\n");
    }

    #[rstest]
    fn test_losing_temp_files_are_removed(tmp_dir: tempfile::TempDir) {
        let input_path = tmp_dir.path().join("input.txt");
        fs::write(&input_path, keyed_lines(&[3, 1, 2])).unwrap();

        let outcome = sorter(tmp_dir.path(), Strategy::ReplacementSelection)
            .sort(&input_path)
            .unwrap();

        let mut remaining = Vec::new();
        for prefix in ["b", "c"] {
            for index in 0..3 {
                let path = tmp_dir.path().join(format!("{}{}", prefix, index));
                if path.exists() {
                    remaining.push(path);
                }
            }
        }
        assert_eq!(remaining, vec![outcome.path]);
    }

    #[rstest]
    fn test_malformed_input_fails_the_sort(tmp_dir: tempfile::TempDir) {
        let input_path = tmp_dir.path().join("input.txt");
        fs::write(&input_path, "1-a\nabc-xyz\n").unwrap();

        let err = sorter(tmp_dir.path(), Strategy::Natural).sort(&input_path).unwrap_err();
        match err {
            SortError::MalformedRecord(line) => assert_eq!(line, "abc-xyz"),
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    fn test_undersized_bucket_is_rejected(#[case] bucket_size: usize) {
        let result = ExternalSorterBuilder::new().with_bucket_size(bucket_size).build();
        match result {
            Err(SortError::OutOfTempFiles { bucket_size: reported }) => {
                assert_eq!(reported, bucket_size)
            }
            _ => panic!("expected OutOfTempFiles"),
        }
    }
}
