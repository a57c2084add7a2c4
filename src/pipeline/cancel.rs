// cancel.rs - Newest-request-wins render tokens
//
// Every render request takes a token from the queue. Taking a new token
// makes all older ones stale; a stale render stops at the next stage
// boundary and never surfaces its partial frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Debug, Default)]
pub struct RenderQueue {
    latest: Arc<AtomicU64>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for a new request, superseding every earlier one
    pub fn next(&self) -> RenderToken {
        let generation = self.latest.fetch_add(1, Ordering::AcqRel) + 1;
        RenderToken { generation, latest: Arc::clone(&self.latest) }
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }
}

#[derive(Clone, Debug)]
pub struct RenderToken {
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl RenderToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::Acquire) == self.generation
    }
}
