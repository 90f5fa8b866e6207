//! Parley Store - World-State persistence
//!
//! One trait, two backends. [`WorldStore`] is the single-writer transaction
//! boundary: `read` hands out an independent snapshot, `atomically` runs a
//! closure against a freshly loaded state under an exclusive store-wide
//! lock and commits all-or-nothing. Only one transaction is ever in flight
//! system-wide; throughput is bounded by serialized writes, which is
//! acceptable at this domain's write volume.
//!
//! - [`MemoryStore`]: mutex-guarded in-process state for tests and
//!   simulations.
//! - [`FileStore`]: one postcard blob on disk, committed by writing a fresh
//!   temp file and atomically renaming it over the previous version, so a
//!   crash mid-write cannot corrupt the last committed state.

#![forbid(unsafe_code)]

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use parley_core::{MarketResult, WorldState};

/// The atomic read/mutate contract every backend must satisfy.
///
/// `atomically` must (1) exclude all other transactions, (2) re-read the
/// current state rather than reuse any cached copy, (3) persist the mutated
/// state durably before releasing the lock, and (4) on an `Err` from the
/// closure, propagate it with zero partial mutation visible afterwards.
pub trait WorldStore: Send + Sync {
    /// A fully materialized, independent copy of the entire state. Never
    /// updates after it is returned.
    fn read(&self) -> MarketResult<WorldState>;

    /// Run `mutate` against the current state under the exclusive lock and
    /// commit the result, or commit nothing at all.
    fn atomically<T, F>(&self, mutate: F) -> MarketResult<T>
    where
        F: FnOnce(&mut WorldState) -> MarketResult<T>;
}

impl<S: WorldStore + ?Sized> WorldStore for std::sync::Arc<S> {
    fn read(&self) -> MarketResult<WorldState> {
        (**self).read()
    }

    fn atomically<T, F>(&self, mutate: F) -> MarketResult<T>
    where
        F: FnOnce(&mut WorldState) -> MarketResult<T>,
    {
        (**self).atomically(mutate)
    }
}
