//! Observability value types: register writes and playback position.

/// One register write a chip backend recorded.
///
/// Append-only per tick, drained by observers (debug views, export).
/// Never consulted on the playback-critical path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterWrite {
    /// Register address in the chip's native address space
    pub addr: u32,
    /// Value written
    pub val: u16,
}

impl RegisterWrite {
    pub const fn new(addr: u32, val: u16) -> Self {
        Self { addr, val }
    }
}

/// A read-only snapshot of where playback currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackPosition {
    /// Index into the order list
    pub order: u8,
    /// Row within the current pattern
    pub row: u16,
    /// Tick within the current row (0 = the row tick)
    pub tick: u8,
    /// Total musical ticks consumed since playback started
    pub total_ticks: u64,
}
