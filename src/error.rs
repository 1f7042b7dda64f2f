//! Error types for fallible table allocation.

use core::alloc::Layout;

use alloc::alloc::handle_alloc_error;

/// Errors that can occur while reserving room in a
/// [`HashTable`](crate::HashTable).
///
/// Only [`HashTable::try_reserve`](crate::HashTable::try_reserve) reports
/// these; every other operation treats them as fatal.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum TryReserveError {
    /// The requested capacity does not fit in `usize` or in a valid
    /// allocation layout.
    #[error("capacity overflow")]
    CapacityOverflow,

    /// The allocator returned an error for the table storage.
    #[error("memory allocation of {} bytes failed", .layout.size())]
    AllocError {
        /// Layout of the allocation that failed.
        layout: Layout,
    },
}

impl TryReserveError {
    /// Escalates the error the way infallible operations do: overflow panics,
    /// allocation failure goes to the global allocation error handler.
    #[cold]
    pub(crate) fn raise(self) -> ! {
        match self {
            TryReserveError::CapacityOverflow => panic!("allocation size overflow"),
            TryReserveError::AllocError { layout } => handle_alloc_error(layout),
        }
    }
}
