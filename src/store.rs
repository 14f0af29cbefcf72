//! Shared hand-off between the acquisition thread and consumers.
//!
//! Frames are published as `Arc<TransformedFrame>`, so a lock is only held
//! for a pointer swap or a vector push, never across I/O or transform work.

use crate::types::TransformedFrame;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-slot holder of the most recent frame.
#[derive(Debug, Default)]
pub struct LatestSlot {
    frame: Mutex<Option<Arc<TransformedFrame>>>,
}

impl LatestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame.
    pub fn publish(&self, frame: Arc<TransformedFrame>) {
        *lock(&self.frame) = Some(frame);
    }

    /// The most recent frame, if any. Never blocks on the producer for longer
    /// than a pointer copy.
    pub fn read(&self) -> Option<Arc<TransformedFrame>> {
        lock(&self.frame).clone()
    }

    pub fn clear(&self) {
        *lock(&self.frame) = None;
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.frame).is_none()
    }
}

/// Append-only, in-order log of every published frame.
///
/// Never truncated by the acquisition loop; use [`Recording::clear`] to reset.
#[derive(Debug)]
pub struct Recording {
    enabled: AtomicBool,
    frames: Mutex<Vec<Arc<TransformedFrame>>>,
}

impl Recording {
    pub fn new(enabled: bool) -> Self {
        Recording {
            enabled: AtomicBool::new(enabled),
            frames: Mutex::new(Vec::new()),
        }
    }

    /// Append `frame` if recording is enabled. Returns whether it was kept.
    pub fn append(&self, frame: Arc<TransformedFrame>) -> bool {
        if !self.is_enabled() {
            return false;
        }
        lock(&self.frames).push(frame);
        true
    }

    /// Copy of the frames recorded so far.
    pub fn snapshot(&self) -> Vec<Arc<TransformedFrame>> {
        lock(&self.frames).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.frames).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.frames).clear();
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}
