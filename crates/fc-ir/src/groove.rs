//! Groove patterns: the per-row tick count sequence.

use arrayvec::ArrayVec;

/// Maximum entries in a groove pattern.
pub const MAX_GROOVE_LEN: usize = 16;

/// An ordered, cyclic sequence of per-row tick counts.
///
/// Each row consumes one entry; when the sequence is exhausted it wraps.
/// The classic "speed 1 / speed 2" pair is a groove of length 2; a plain
/// speed is a groove of length 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroovePattern {
    entries: ArrayVec<u8, MAX_GROOVE_LEN>,
}

impl GroovePattern {
    /// A constant-speed groove.
    pub fn constant(ticks: u8) -> Self {
        let mut entries = ArrayVec::new();
        entries.push(ticks.max(1));
        Self { entries }
    }

    /// A groove from a sequence of tick counts. Zero entries are clamped
    /// to 1; an empty slice falls back to speed 6.
    pub fn from_slice(ticks: &[u8]) -> Self {
        let mut entries = ArrayVec::new();
        for &t in ticks.iter().take(MAX_GROOVE_LEN) {
            entries.push(t.max(1));
        }
        if entries.is_empty() {
            entries.push(6);
        }
        Self { entries }
    }

    /// Number of entries in the cycle.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        false // always at least one entry
    }

    /// Tick count for the given cycle position (wraps).
    pub fn entry(&self, index: usize) -> u8 {
        self.entries[index % self.entries.len()]
    }

    /// Overwrite one slot; grows the cycle (with copies of the last
    /// entry) if `slot` is past the current end, up to the maximum.
    pub fn set_entry(&mut self, slot: usize, ticks: u8) {
        if slot >= MAX_GROOVE_LEN {
            return;
        }
        while self.entries.len() <= slot {
            let last = self.entries.last().copied().unwrap_or(6);
            self.entries.push(last);
        }
        self.entries[slot] = ticks.max(1);
    }

    /// Total ticks across one full cycle.
    pub fn cycle_ticks(&self) -> u32 {
        self.entries.iter().map(|&t| t as u32).sum()
    }
}

impl Default for GroovePattern {
    fn default() -> Self {
        Self::constant(6)
    }
}
