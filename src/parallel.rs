//! Parallel merge coordination.

use rayon::prelude::*;

use crate::bucket::Bucket;
use crate::merger::{merge_one_run, RunReader};
use crate::sort::{merge_rounds, open_run_readers, PassStats, SortError};

/// Runs one merge pass with independent group merges fanned out on `pool`.
///
/// Non-empty source readers are striped into disjoint groups of at least
/// two; every group owns its readers and one dedicated destination file, so
/// workers share nothing and the parallel collect is the pass boundary.
/// With too few readers to form two groups the pass degrades to the
/// sequential round-robin driver, which also keeps the final pass
/// deterministic.
pub(crate) fn merge_pass_parallel(
    pool: &rayon::ThreadPool,
    source: &Bucket,
    dest: &mut Bucket,
    read_buf_size: usize,
    write_buf_size: usize,
) -> Result<PassStats, SortError> {
    let mut readers = open_run_readers(source, read_buf_size)?;
    dest.clear_all()?;

    // A group of one reader would copy its runs without reducing them.
    let group_count = (readers.len() / 2).clamp(1, dest.len());
    if group_count < 2 {
        let runs = merge_rounds(&mut readers, dest, write_buf_size)?;
        dest.reset_cursors()?;
        return Ok(PassStats { runs });
    }

    let mut groups: Vec<Vec<RunReader>> = (0..group_count).map(|_| Vec::new()).collect();
    for (index, reader) in readers.into_iter().enumerate() {
        groups[index % group_count].push(reader);
    }

    let group_runs: Result<Vec<usize>, SortError> = pool.install(|| {
        dest.files_mut()[..group_count]
            .par_iter_mut()
            .zip(groups.into_par_iter())
            .map(|(file, mut group)| {
                let mut runs = 0;
                while group.iter().any(RunReader::has_data) {
                    let mut writer = file.writer(write_buf_size)?;
                    let written = merge_one_run(&mut group, &mut writer)?;
                    drop(writer);
                    if written > 0 {
                        runs += 1;
                    }
                }
                Ok(runs)
            })
            .collect()
    });

    let runs = group_runs?.into_iter().sum();
    dest.reset_cursors()?;
    Ok(PassStats { runs })
}
