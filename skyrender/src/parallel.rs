//! Deterministic parallel work splitting.
//!
//! Every chunk gets its own `StdRng` seeded with `seed + chunk_index`
//! (wrapping), and results come back in chunk order. The output of a seeded
//! call therefore does not depend on how rayon schedules the chunks.

use ndarray::{ArrayViewMut2, Axis};
use rand::rngs::StdRng;
use rand::{thread_rng, RngCore, SeedableRng};
use rayon::prelude::*;

/// Rows per chunk when processing images.
pub const DEFAULT_ROW_CHUNK: usize = 64;

/// The caller's seed, or a fresh one from the thread RNG.
///
/// Returns the seed and whether it was supplied.
pub fn resolve_seed(seed: Option<u64>) -> (u64, bool) {
    match seed {
        Some(seed) => (seed, true),
        None => (thread_rng().next_u64(), false),
    }
}

/// RNG for chunk `index` of a run seeded with `seed`.
pub fn chunk_rng(seed: u64, index: usize) -> StdRng {
    StdRng::seed_from_u64(seed.wrapping_add(index as u64))
}

/// Split `total` items into chunks of at most `chunk_size`.
///
/// All chunks but the last are full; `total == 0` gives no chunks.
pub fn chunk_sizes(total: usize, chunk_size: usize) -> Vec<usize> {
    let chunk_size = chunk_size.max(1);
    let full = total / chunk_size;
    let mut sizes = vec![chunk_size; full];
    let rest = total % chunk_size;
    if rest > 0 {
        sizes.push(rest);
    }
    sizes
}

/// Run `work` once per chunk in parallel and collect the results in chunk order.
///
/// `work` receives the chunk index, the number of items in the chunk and the
/// chunk's own RNG. The first error (in chunk order) is returned.
pub fn map_seeded_chunks<T, E, F>(
    total: usize,
    chunk_size: usize,
    seed: u64,
    work: F,
) -> Result<Vec<T>, E>
where
    T: Send,
    E: Send,
    F: Fn(usize, usize, &mut StdRng) -> Result<T, E> + Send + Sync,
{
    let results: Vec<Result<T, E>> = chunk_sizes(total, chunk_size)
        .into_par_iter()
        .enumerate()
        .map(|(index, count)| {
            let mut rng = chunk_rng(seed, index);
            work(index, count, &mut rng)
        })
        .collect();
    results.into_iter().collect()
}

/// Process row blocks of an array in parallel, each with its own seeded RNG.
///
/// # Arguments
/// * `array` - Array to modify in place
/// * `seed` - Base seed; block `i` uses `seed + i`
/// * `rows_per_chunk` - Rows per block (`None` for [`DEFAULT_ROW_CHUNK`])
/// * `processor` - Closure applied to each block
pub fn process_rows_in_parallel_chunks<F>(
    array: &mut ArrayViewMut2<'_, f64>,
    seed: u64,
    rows_per_chunk: Option<usize>,
    processor: F,
) where
    F: Fn(&mut ArrayViewMut2<'_, f64>, &mut StdRng) + Send + Sync,
{
    let rows = rows_per_chunk.unwrap_or(DEFAULT_ROW_CHUNK).max(1);
    array
        .axis_chunks_iter_mut(Axis(0), rows)
        .into_par_iter()
        .enumerate()
        .for_each(|(index, mut chunk)| {
            let mut rng = chunk_rng(seed, index);
            processor(&mut chunk, &mut rng);
        });
}
