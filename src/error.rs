use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Error
////////////////////////////////////////////////////////////////////////////////////////////////////

/// The error type for operations that need per-thread reclamation resources.
///
/// Contention is never reported as an error, it is resolved internally by
/// retrying, and popping from an empty structure returns [`None`].
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Every slot of a bounded hazard pointer table is currently owned by
    /// some other thread handle.
    #[error("all {capacity} hazard pointer slots are in use")]
    ResourceExhausted {
        /// The configured number of slots.
        capacity: usize,
    },
}
