//! Pattern and cell types for tracker sequences.

use alloc::vec::Vec;
use arrayvec::ArrayVec;

use crate::effects::Effect;

/// Maximum effect columns per cell.
pub const MAX_EFFECT_COLS: usize = 4;

/// A note value in a pattern cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Note {
    /// No note
    #[default]
    None,
    /// Note on (0-119, where 60 = C-5, A-4 = 57 at 440 Hz)
    On(u8),
    /// Note off / key release
    Off,
}

/// A single cell in a pattern.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cell {
    /// Note value
    pub note: Note,
    /// Instrument number (0 = none, 1-255 = instrument index + 1)
    pub instrument: u8,
    /// Volume column (None = keep current)
    pub volume: Option<u8>,
    /// Effect columns
    pub effects: ArrayVec<Effect, MAX_EFFECT_COLS>,
}

impl Cell {
    /// Create an empty cell.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns true if the cell is completely empty.
    pub fn is_empty(&self) -> bool {
        self.note == Note::None
            && self.instrument == 0
            && self.volume.is_none()
            && self.effects.iter().all(|e| *e == Effect::None)
    }
}

/// A pattern containing rows of cells across all channels.
#[derive(Clone, Debug)]
pub struct Pattern {
    /// Number of rows (typically 64, can be 1-256)
    pub rows: u16,
    /// Number of channels
    pub channels: u8,
    /// Pattern data, stored row-major: data[row * channels + channel]
    pub data: Vec<Cell>,
}

impl Pattern {
    /// Create a new pattern with empty cells.
    pub fn new(rows: u16, channels: u8) -> Self {
        Self {
            rows,
            channels,
            data: alloc::vec![Cell::empty(); rows as usize * channels as usize],
        }
    }

    /// Get a reference to a cell.
    pub fn cell(&self, row: u16, channel: u8) -> &Cell {
        debug_assert!(row < self.rows);
        debug_assert!(channel < self.channels);
        &self.data[row as usize * self.channels as usize + channel as usize]
    }

    /// Get a mutable reference to a cell.
    pub fn cell_mut(&mut self, row: u16, channel: u8) -> &mut Cell {
        debug_assert!(row < self.rows);
        debug_assert!(channel < self.channels);
        &mut self.data[row as usize * self.channels as usize + channel as usize]
    }

    /// Iterate over all cells in a row.
    pub fn row(&self, row: u16) -> &[Cell] {
        let start = row as usize * self.channels as usize;
        &self.data[start..start + self.channels as usize]
    }
}
