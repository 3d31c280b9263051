//! Bounded engine warning log.
//!
//! Non-fatal playback problems (chip init fallback, resampler
//! underruns, dropped commands) are recorded here for consumers to
//! drain, and mirrored to `tracing` for logs. The log is bounded;
//! when full the oldest entry goes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use fc_ir::PlaybackPosition;
use tracing::warn;

/// Entries kept before the oldest is dropped.
pub const WARNING_CAP: usize = 64;

#[derive(Clone, Debug)]
pub struct Warning {
    pub message: String,
    /// Where playback was when this happened, if known
    pub position: Option<PlaybackPosition>,
}

/// Cheaply clonable handle to a shared warning queue.
#[derive(Clone, Default)]
pub struct WarningLog {
    inner: Arc<Mutex<VecDeque<Warning>>>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, message: impl Into<String>) {
        self.record_at(message, None);
    }

    pub fn record_at(&self, message: impl Into<String>, position: Option<PlaybackPosition>) {
        let message = message.into();
        warn!(message = %message, "engine warning");
        if let Ok(mut q) = self.inner.lock() {
            if q.len() >= WARNING_CAP {
                q.pop_front();
            }
            q.push_back(Warning { message, position });
        }
    }

    /// Take every pending warning, oldest first.
    pub fn drain(&self) -> Vec<Warning> {
        match self.inner.lock() {
            Ok(mut q) => q.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
