//! Song structure: chip lineup, order list, instrument bank.

use alloc::vec::Vec;
use arrayvec::{ArrayString, ArrayVec};
use slotmap::{new_key_type, SlotMap};

use crate::groove::GroovePattern;
use crate::pattern::Pattern;

/// Maximum chip instances in one song.
pub const MAX_CHIPS: usize = 8;

/// Maximum logical channels across all chips.
pub const MAX_CHANNELS: usize = 64;

new_key_type! {
    /// Stable identity of an instrument in the bank. Chip-side caches are
    /// keyed on this, so the editor can delete/replace instruments while
    /// playing and the engine can invalidate precisely.
    pub struct InsKey;
}

/// Which chip backend a [`ChipEntry`] asks for.
///
/// This is a data-model tag; the engine maps it to a constructor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChipKind {
    /// No-op backend producing silence (also the init-failure fallback)
    Silent,
    /// Square/noise PSG with 4 channels
    Pulse,
}

/// One chip instance in the song's system configuration.
#[derive(Clone, Copy, Debug)]
pub struct ChipEntry {
    /// Which backend to instantiate
    pub kind: ChipKind,
    /// Master clock in Hz (0 = backend default)
    pub clock: u32,
    /// Mix volume, 0-256 (256 = unity)
    pub volume: u16,
}

impl ChipEntry {
    pub fn new(kind: ChipKind) -> Self {
        Self { kind, clock: 0, volume: 256 }
    }
}

/// An instrument: the per-note parameter set chips are configured with.
#[derive(Clone, Debug)]
pub struct Instrument {
    pub name: ArrayString<32>,
    /// Initial volume (0-64)
    pub volume: u8,
    /// Pulse duty cycle index (chip-specific meaning)
    pub duty: u8,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            volume: 64,
            duty: 2,
        }
    }
}

impl Instrument {
    pub fn new(name: &str) -> Self {
        let mut ins = Self::default();
        let _ = ins.name.try_push_str(name);
        ins
    }
}

/// A complete song.
///
/// The engine treats this as read-only; all mutation happens outside and
/// is announced through the dispatch contract's notify hooks.
#[derive(Clone, Debug)]
pub struct Song {
    /// Song title
    pub title: ArrayString<32>,
    /// Base tick rate in Hz (60 = NTSC, 50 = PAL, anything custom)
    pub tick_hz: u32,
    /// Virtual tempo numerator/denominator: a fractional multiplier on
    /// the tick rate (1/1 = nominal)
    pub virt_tempo_num: u16,
    pub virt_tempo_den: u16,
    /// Per-row tick counts
    pub groove: GroovePattern,
    /// Ticks per arpeggio stage
    pub arp_speed: u8,
    /// Chip lineup
    pub chips: ArrayVec<ChipEntry, MAX_CHIPS>,
    /// Order list: indices into `patterns`
    pub orders: Vec<u8>,
    /// Pattern pool (each pattern spans all channels)
    pub patterns: Vec<Pattern>,
    /// Instrument bank
    pub ins_bank: SlotMap<InsKey, Instrument>,
    /// Pattern-visible instrument numbering: index -> bank key
    pub ins_list: Vec<InsKey>,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            title: ArrayString::new(),
            tick_hz: 60,
            virt_tempo_num: 1,
            virt_tempo_den: 1,
            groove: GroovePattern::default(),
            arp_speed: 1,
            chips: ArrayVec::new(),
            orders: Vec::new(),
            patterns: Vec::new(),
            ins_bank: SlotMap::with_key(),
            ins_list: Vec::new(),
        }
    }
}

impl Song {
    /// Create a new empty song.
    pub fn new(title: &str) -> Self {
        let mut song = Self::default();
        let _ = song.title.try_push_str(title);
        song
    }

    /// Add a pattern, returning its index.
    pub fn add_pattern(&mut self, pattern: Pattern) -> u8 {
        self.patterns.push(pattern);
        (self.patterns.len() - 1) as u8
    }

    /// Append an order entry.
    pub fn add_order(&mut self, pattern_index: u8) {
        self.orders.push(pattern_index);
    }

    /// Add an instrument to the bank and the pattern-visible list.
    pub fn add_instrument(&mut self, ins: Instrument) -> InsKey {
        let key = self.ins_bank.insert(ins);
        self.ins_list.push(key);
        key
    }

    /// Resolve a 1-based pattern instrument number to a live instrument.
    /// Returns `None` for 0, out-of-range numbers, and deleted bank
    /// entries; the engine turns all of those into a no-op note.
    pub fn instrument(&self, number: u8) -> Option<&Instrument> {
        if number == 0 {
            return None;
        }
        let key = *self.ins_list.get(number as usize - 1)?;
        self.ins_bank.get(key)
    }

    /// Rows per pattern at a given order position (0 if out of range).
    pub fn pattern_rows(&self, order: u8) -> u16 {
        self.orders
            .get(order as usize)
            .and_then(|&p| self.patterns.get(p as usize))
            .map(|p| p.rows)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;

    #[test]
    fn instrument_resolution() {
        let mut song = Song::new("test");
        let key = song.add_instrument(Instrument::new("lead"));

        assert!(song.instrument(0).is_none());
        assert_eq!(song.instrument(1).unwrap().name.as_str(), "lead");
        assert!(song.instrument(2).is_none());

        // deleting from the bank makes the number dangle gracefully
        song.ins_bank.remove(key);
        assert!(song.instrument(1).is_none());
    }

    #[test]
    fn pattern_rows_lookup() {
        let mut song = Song::new("test");
        let idx = song.add_pattern(Pattern::new(32, 4));
        song.add_order(idx);

        assert_eq!(song.pattern_rows(0), 32);
        assert_eq!(song.pattern_rows(1), 0);
    }

    #[test]
    fn default_tempo_is_unity() {
        let song = Song::default();
        assert_eq!(song.virt_tempo_num, 1);
        assert_eq!(song.virt_tempo_den, 1);
        assert_eq!(song.tick_hz, 60);
    }
}
