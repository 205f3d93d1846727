//! Per-source mutual exclusion.
//!
//! Measurement probes bind to the source IP, so two concurrent tests from
//! the same source would collide at the socket level. The registry rejects
//! a busy source rather than blocking: the batch keeps moving and the
//! caller decides what to do with the skipped pair. Exclusion is
//! process-local by design — cross-process writers only contend on the
//! ledger, never on sources.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// In-memory registry of source IPs with a test in flight.
#[derive(Debug, Default)]
pub struct SourceLockManager {
    active: Mutex<HashSet<String>>,
}

impl SourceLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim exclusive use of a source IP. Returns `true` iff the
    /// source was not already active. Never blocks.
    pub fn acquire(&self, source_ip: &str) -> bool {
        self.active.lock().unwrap().insert(source_ip.to_string())
    }

    /// Release a source IP. Idempotent — releasing an IP that is not held
    /// is a no-op.
    pub fn release(&self, source_ip: &str) {
        self.active.lock().unwrap().remove(source_ip);
    }
}

/// RAII claim on a source IP, released on drop so no exit path (including
/// a panic) can leave a source dangling.
pub struct SourceGuard {
    locks: Arc<SourceLockManager>,
    source_ip: String,
}

impl SourceGuard {
    /// Try to claim `source_ip`; `None` if it is already active.
    pub fn acquire(locks: &Arc<SourceLockManager>, source_ip: &str) -> Option<Self> {
        if locks.acquire(source_ip) {
            Some(Self {
                locks: Arc::clone(locks),
                source_ip: source_ip.to_string(),
            })
        } else {
            None
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.locks.release(&self.source_ip);
    }
}
