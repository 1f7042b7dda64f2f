#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Emits a `tracing` debug event when the `tracing` feature is enabled, and
/// expands to nothing otherwise.
macro_rules! trace_event {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!($($arg)*);
    };
}
pub(crate) use trace_event;

mod control;
mod error;

/// Key hashing: the [`KeyHash`] trait, the integer mix, FNV-1a, and the
/// `Display` fallback.
pub mod hashing;

pub mod hash_table;

pub use control::DELETED;
pub use control::EMPTY;
pub use control::GROUP_SIZE;
pub use error::TryReserveError;
#[cfg(any(test, feature = "stats"))]
pub use hash_table::DebugStats;
pub use hash_table::HashTable;
#[cfg(any(test, feature = "stats"))]
pub use hash_table::ProbeHistogram;
pub use hashing::DisplayKey;
pub use hashing::KeyHash;
