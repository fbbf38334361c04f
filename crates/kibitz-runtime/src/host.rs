use std::num::NonZeroUsize;

/// Number of processors the host reports as usable by this process.
///
/// Falls back to 1 when the platform cannot say. Used only to size engine
/// thread counts, never for correctness.
pub fn available_cores() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}
