//! Error type for caller contract violations.

/// Ways a caller can misuse a [`SortedSparseMap`](crate::SortedSparseMap) or one of its cursors.
///
/// The plain operations panic with this error's message; the `try_` variants
/// hand it back instead.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An index-based operation was given a position outside `[0, size)`.
    #[error("index {index} out of bounds for size {size}")]
    IndexOutOfBounds { index: usize, size: usize },

    /// A cursor's `remove` was called without a preceding `next`, or twice
    /// for the same element.
    #[error("next() must be called before remove()")]
    IteratorState,

    /// A cursor's `next` was called after the last element.
    #[error("no more elements")]
    Exhausted,
}
