//! The chip-agnostic command set.
//!
//! A [`Command`] is one atomic musical instruction. The channel state
//! machine produces them, and chip backends consume them through the
//! dispatch contract. A command is immutable once created and is consumed
//! by exactly one dispatch call; ordering within a tick follows channel
//! processing order, ordering across ticks is enforced by the scheduler.

/// Response code a chip returns when a portamento slide has reached its
/// target note, telling the scheduler to switch the channel to legato.
pub const PORTA_REACHED: i32 = 2;

/// What a command does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    /// Trigger a note. `value` = note number, `value2` = volume.
    NoteOn,
    /// Release the current note.
    NoteOff,
    /// Select an instrument. `value` = instrument index.
    Instrument,
    /// Set channel volume. `value` = volume (0-64).
    Volume,
    /// Set the pitch offset. `value` = offset in 1/256ths of a semitone,
    /// applied on top of the channel's base note.
    Pitch,
    /// Change the sounding note without re-triggering. `value` = note.
    Legato,
    /// Slide toward a target note. `value` = speed, `value2` = target
    /// note. The chip returns [`PORTA_REACHED`] once the target is hit.
    NotePorta,
    /// Announce that a portamento is about to start (`value` != 0) or has
    /// been cancelled (`value` == 0), so chips can latch slide state.
    PrePorta,
    /// Set panning. `value` = 0-255, 128 = center.
    Panning,
    /// Chip-specific parameter. `value` = parameter index,
    /// `value2` = parameter value. Chips ignore indices they don't know.
    ChipParam,
}

/// One atomic musical instruction addressed to a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    /// What to do
    pub kind: CommandKind,
    /// Target channel (chip-local once routed by the scheduler)
    pub chan: u8,
    /// First argument (meaning depends on `kind`)
    pub value: i32,
    /// Second argument (meaning depends on `kind`)
    pub value2: i32,
}

impl Command {
    /// Create a command with both arguments.
    pub const fn new(kind: CommandKind, chan: u8, value: i32, value2: i32) -> Self {
        Self { kind, chan, value, value2 }
    }

    /// Create a command with a single argument.
    pub const fn of(kind: CommandKind, chan: u8, value: i32) -> Self {
        Self { kind, chan, value, value2: 0 }
    }

    /// Same command addressed to a different (chip-local) channel.
    pub const fn on_chan(self, chan: u8) -> Self {
        Self { chan, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_zeroes_second_argument() {
        let cmd = Command::of(CommandKind::Volume, 3, 40);
        assert_eq!(cmd.chan, 3);
        assert_eq!(cmd.value, 40);
        assert_eq!(cmd.value2, 0);
    }

    #[test]
    fn on_chan_rewrites_only_channel() {
        let cmd = Command::new(CommandKind::NotePorta, 7, 4, 60).on_chan(1);
        assert_eq!(cmd.chan, 1);
        assert_eq!(cmd.value, 4);
        assert_eq!(cmd.value2, 60);
    }
}
