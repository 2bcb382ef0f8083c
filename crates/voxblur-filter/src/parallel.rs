use rayon::prelude::*;
use thiserror::Error;

/// Errors that can occur during parallel execution.
#[derive(Error, Debug, PartialEq)]
pub enum ParallelError {
    /// The thread pool failed to build.
    #[error("failed to build thread pool: {0}")]
    BuildError(String),

    /// The requested thread count is invalid.
    #[error("thread count must be > 0, got {0}")]
    InvalidThreadCount(usize),

    /// The chunk length must be positive.
    #[error("chunk length must be > 0")]
    InvalidChunkLength,
}

/// Controls how the slabs of a volume are distributed over threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExecutionStrategy {
    /// Run sequentially on the current thread.
    ///
    /// Useful for small volumes, debugging, or when the overhead of parallelization
    /// outweighs the benefits.
    Serial,

    /// Use the global Rayon thread pool.
    #[default]
    Parallel,

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Creates a new thread pool on every call, which has significant overhead.
    /// Use this primarily for benchmarking or specific isolation needs.
    Fixed(usize),
}

/// Process `dst` in chunks of `chunk_len` elements with the given strategy.
///
/// Every worker owns a scratch value created by `init` and reuses it for all chunks it
/// processes.
///
/// # Arguments
///
/// * `strategy` - The execution strategy.
/// * `dst` - The destination slice.
/// * `chunk_len` - Number of elements per chunk; the last chunk may be shorter.
/// * `init` - Creates the per-worker scratch state.
/// * `op` - Called with the scratch state, the chunk index and the chunk.
pub fn for_each_chunk_mut<T, S, I, F>(
    strategy: ExecutionStrategy,
    dst: &mut [T],
    chunk_len: usize,
    init: I,
    op: F,
) -> Result<(), ParallelError>
where
    T: Send,
    I: Fn() -> S + Send + Sync,
    F: Fn(&mut S, usize, &mut [T]) + Send + Sync,
{
    try_for_each_chunk_mut(strategy, dst, chunk_len, init, |scratch, i, chunk| {
        op(scratch, i, chunk);
        Ok::<(), ParallelError>(())
    })
}

/// Fallible variant of [`for_each_chunk_mut`].
///
/// Processing stops at the first error returned by `op`, which is then returned. Chunks
/// already handed to other workers may still complete.
pub fn try_for_each_chunk_mut<T, S, E, I, F>(
    strategy: ExecutionStrategy,
    dst: &mut [T],
    chunk_len: usize,
    init: I,
    op: F,
) -> Result<(), E>
where
    T: Send,
    E: Send + From<ParallelError>,
    I: Fn() -> S + Send + Sync,
    F: Fn(&mut S, usize, &mut [T]) -> Result<(), E> + Send + Sync,
{
    if chunk_len == 0 {
        return Err(ParallelError::InvalidChunkLength.into());
    }

    match strategy {
        ExecutionStrategy::Serial => {
            let mut scratch = init();
            dst.chunks_mut(chunk_len)
                .enumerate()
                .try_for_each(|(i, chunk)| op(&mut scratch, i, chunk))
        }
        ExecutionStrategy::Parallel => dst
            .par_chunks_mut(chunk_len)
            .enumerate()
            .try_for_each_init(&init, |scratch, (i, chunk)| op(scratch, i, chunk)),
        ExecutionStrategy::Fixed(n) => {
            if n == 0 {
                return Err(ParallelError::InvalidThreadCount(n).into());
            }
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| ParallelError::BuildError(e.to_string()))?;

            pool.install(|| {
                dst.par_chunks_mut(chunk_len)
                    .enumerate()
                    .try_for_each_init(&init, |scratch, (i, chunk)| op(scratch, i, chunk))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_indices(strategy: ExecutionStrategy) -> Result<Vec<usize>, ParallelError> {
        let mut dst = vec![0usize; 10];
        for_each_chunk_mut(
            strategy,
            &mut dst,
            3,
            || 0usize,
            |calls, i, chunk| {
                *calls += 1;
                chunk.iter_mut().for_each(|v| *v = i);
            },
        )?;
        Ok(dst)
    }

    #[test]
    fn test_strategies_agree() -> Result<(), ParallelError> {
        let expected = vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3];
        assert_eq!(fill_indices(ExecutionStrategy::Serial)?, expected);
        assert_eq!(fill_indices(ExecutionStrategy::Parallel)?, expected);
        assert_eq!(fill_indices(ExecutionStrategy::Fixed(2))?, expected);
        Ok(())
    }

    #[test]
    fn test_scratch_reused_serially() -> Result<(), ParallelError> {
        let mut dst = vec![0usize; 8];
        for_each_chunk_mut(
            ExecutionStrategy::Serial,
            &mut dst,
            2,
            || 0usize,
            |calls, _, chunk| {
                *calls += 1;
                chunk[0] = *calls;
            },
        )?;
        assert_eq!(dst, vec![1, 0, 2, 0, 3, 0, 4, 0]);
        Ok(())
    }

    #[test]
    fn test_invalid_arguments() {
        let mut dst = vec![0u8; 4];
        assert_eq!(
            for_each_chunk_mut(ExecutionStrategy::Fixed(0), &mut dst, 1, || (), |_, _, _| {}),
            Err(ParallelError::InvalidThreadCount(0))
        );
        assert_eq!(
            for_each_chunk_mut(ExecutionStrategy::Serial, &mut dst, 0, || (), |_, _, _| {}),
            Err(ParallelError::InvalidChunkLength)
        );
    }

    #[test]
    fn test_errors_propagate() {
        for strategy in [
            ExecutionStrategy::Serial,
            ExecutionStrategy::Parallel,
            ExecutionStrategy::Fixed(2),
        ] {
            let mut dst = vec![0u8; 12];
            let res = try_for_each_chunk_mut(strategy, &mut dst, 4, || (), |_, i, _| {
                if i == 1 {
                    Err(ParallelError::BuildError("chunk 1".to_string()))
                } else {
                    Ok(())
                }
            });
            assert_eq!(res, Err(ParallelError::BuildError("chunk 1".to_string())));
        }
    }
}
