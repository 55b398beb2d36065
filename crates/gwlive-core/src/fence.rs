//! Generation fencing.
//!
//! Every connection attempt started by `open()` gets a fresh generation, and
//! every inbound message is tagged with the generation of the link that
//! received it. `close()` advances the generation under the write lock; the
//! pipeline checks the tag and applies the message while holding the read
//! lock. Once `advance` returns, no message from an older generation can
//! reach the store.

use std::sync::{Arc, PoisonError, RwLock};

/// Shared generation counter.
#[derive(Debug, Clone, Default)]
pub struct GenerationFence {
    // A std lock is enough: no holder awaits, and a read hold spans a single
    // synchronous `store.apply` batch, so `advance` in async code waits at
    // most that long.
    current: Arc<RwLock<u64>>,
}

impl GenerationFence {
    /// Fence starting at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation.
    pub fn current(&self) -> u64 {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `generation` is still current.
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }

    /// Supersede every outstanding generation and return the new one.
    ///
    /// Blocks until in-flight [`run_if_current`](Self::run_if_current) calls
    /// have finished.
    pub fn advance(&self) -> u64 {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current += 1;
        *current
    }

    /// Run `f` only if `generation` is current, holding the fence for the
    /// duration so it cannot be advanced underneath.
    pub fn run_if_current<R>(&self, generation: u64, f: impl FnOnce() -> R) -> Option<R> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        (*current == generation).then(f)
    }
}
