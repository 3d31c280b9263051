//! Pattern effect commands.

/// An effect in a pattern cell's effect column.
///
/// The hex mnemonics follow the classic tracker convention the original
/// data comes from; the engine only ever sees this enum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Effect {
    /// No effect
    #[default]
    None,
    /// 00xy: alternate between note, note+x, note+y
    Arpeggio { x: u8, y: u8 },
    /// 01xx: pitch slide up, speed units per tick
    PortaUp(u8),
    /// 02xx: pitch slide down
    PortaDown(u8),
    /// 03xx: slide toward the cell's note without re-triggering
    TonePorta(u8),
    /// 04xy: vibrato with rate x, depth y
    Vibrato { rate: u8, depth: u8 },
    /// 07xy: tremolo with rate x, depth y
    Tremolo { rate: u8, depth: u8 },
    /// 08xx: panning (0-255, 128 = center)
    Panning(u8),
    /// 09xx / 0Fxx generalized: overwrite one groove entry
    SetGroove { slot: u8, ticks: u8 },
    /// 0Axy: volume slide; positive = up, negative = down
    VolumeSlide(i8),
    /// 0Bxx: jump to order xx, row 0
    OrderJump(u8),
    /// 0Cxx: retrigger the note every xx ticks
    Retrigger(u8),
    /// 0Dxx: advance to the next order, starting at row xx
    NextOrder(u8),
    /// E0xx: ticks per arpeggio stage
    ArpSpeed(u8),
    /// E1xy: slide up x semitones at speed y
    PortaUpSemi { semitones: u8, speed: u8 },
    /// E2xy: slide down x semitones at speed y
    PortaDownSemi { semitones: u8, speed: u8 },
    /// E3xx: vibrato direction (0 = both, 1 = up only, 2 = down only)
    VibratoDir(u8),
    /// E4xx: vibrato fine depth multiplier (0-15)
    VibratoFine(u8),
    /// E5xx: pitch offset, xx - 0x80 in 1/256ths of a semitone steps
    Pitch(u8),
    /// EAxx: legato mode on/off
    Legato(bool),
    /// ECxx: cut the note after xx ticks
    NoteCut(u8),
    /// EDxx: delay this row's content on this channel by xx ticks
    RowDelay(u8),
    /// FFxx: stop the song at this row
    Stop,
    /// Chip-specific effect forwarded verbatim
    ChipParam { param: u8, value: u8 },
}

impl Effect {
    /// Does this effect alter playback order? (consumed by the walk pass)
    pub fn is_jump(&self) -> bool {
        matches!(self, Effect::OrderJump(_) | Effect::NextOrder(_) | Effect::Stop)
    }
}
