//! The chip dispatch contract.
//!
//! This is the single seam between the scheduler/resampling layer and
//! any sound-chip backend. The scheduler only ever talks to chips
//! through [`ChipDispatch`]; a backend's lifecycle is
//! `Uninitialized → Ready ⇄ Rendering`, with `reset` returning to Ready
//! without reallocating.

use core::fmt;

use fc_ir::{ChipKind, Command, InsKey, RegisterWrite};

use crate::chips::{PulseChip, SilentChip};

/// Maximum output lines (mono = 1, stereo = 2) per chip.
pub const MAX_OUTPUTS: usize = 2;

/// Samples kept per channel for oscilloscope views.
pub const OSC_BUF_LEN: usize = 256;

/// Configuration handed to a chip at init time.
#[derive(Clone, Copy, Debug)]
pub struct ChipConfig {
    /// Master clock in Hz (0 = backend default)
    pub clock: u32,
    /// Output sample rate the host mixes at (chips may pick any native
    /// rate; this is advisory, e.g. for rate-divider selection)
    pub sample_rate: u32,
    /// Backend-defined flag bits
    pub flags: u32,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self { clock: 0, sample_rate: 44100, flags: 0 }
    }
}

/// Why a chip refused to initialize.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitError {
    /// The requested clock is outside the backend's supported range
    UnsupportedClock,
    /// The flag bits request a configuration the backend can't do
    UnsupportedFlags,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::UnsupportedClock => write!(f, "unsupported clock rate"),
            InitError::UnsupportedFlags => write!(f, "unsupported configuration flags"),
        }
    }
}

impl std::error::Error for InitError {}

/// The polymorphic contract every sound-chip backend implements.
///
/// `init` either fully initializes or fails; it never leaves the backend
/// half-configured. Unknown commands are ignored, never treated as an
/// error, so songs using newer commands still play on older backends.
pub trait ChipDispatch: Send {
    /// Allocate internal state for the given configuration and return
    /// the number of channels this instance provides.
    fn init(&mut self, cfg: &ChipConfig) -> Result<usize, InitError>;

    /// Apply one command. The return value signals scheduler actions
    /// (e.g. [`fc_ir::PORTA_REACHED`]); 0 means plain success, and
    /// unknown command kinds return 0 as well.
    fn dispatch(&mut self, cmd: Command) -> i32;

    /// Advance per-tick internal sequencing (envelopes, macros),
    /// independent of any single command. `sys_tick` is false for
    /// virtual-tempo sub-ticks that consumed no musical tick.
    fn tick(&mut self, sys_tick: bool);

    /// Render `len` samples at the chip's native rate into the caller's
    /// buffers, one per output line. Must fill every slot.
    fn acquire(&mut self, out: &mut [&mut [i16]], len: usize);

    /// Return to power-on-equivalent state without reallocating.
    /// Calling twice is the same as calling once.
    fn reset(&mut self);

    /// Native sample rate (valid after `init`).
    fn native_rate(&self) -> u32;

    /// Number of output lines (1 = mono, 2 = stereo), at most
    /// [`MAX_OUTPUTS`].
    fn output_count(&self) -> usize {
        1
    }

    /// Does this chip's output carry a native DC offset that the
    /// container should compensate when high-pass filtering?
    fn dc_off_required(&self) -> bool {
        false
    }

    /// Mute or unmute one channel.
    fn mute_channel(&mut self, ch: usize, mute: bool);

    /// Most recent rendered samples for one channel (oscilloscope view).
    fn osc_buffer(&self, ch: usize) -> &[i16];

    /// Register writes recorded since last drained. Append-only per
    /// tick; the caller drains it.
    fn register_pool(&mut self) -> &mut Vec<RegisterWrite>;

    /// The instrument changed; drop any cache keyed on it.
    fn notify_ins_changed(&mut self, _ins: InsKey) {}

    /// A wavetable changed; drop any cache keyed on it.
    fn notify_wave_changed(&mut self, _wave: u32) {}

    /// The instrument was deleted; fall back to defaults if it was live.
    fn notify_ins_deleted(&mut self, _ins: InsKey) {}
}

/// Instantiate a backend for a chip-kind tag.
///
/// This is the whole registry: a tag-to-constructor mapping. New chips
/// register here and nowhere else.
pub fn create_chip(kind: ChipKind) -> Box<dyn ChipDispatch> {
    match kind {
        ChipKind::Silent => Box::new(SilentChip::new()),
        ChipKind::Pulse => Box::new(PulseChip::new()),
    }
}

/// Channel count a chip-kind provides, known without instantiating it.
/// The init-failure fallback uses this to keep the channel map stable.
pub fn chip_channels(kind: ChipKind) -> usize {
    match kind {
        ChipKind::Silent => 1,
        ChipKind::Pulse => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_creates_requested_kind() {
        let mut chip = create_chip(ChipKind::Silent);
        let chans = chip.init(&ChipConfig::default()).unwrap();
        assert!(chans > 0);
    }

    #[test]
    fn init_error_displays() {
        let msg = format!("{}", InitError::UnsupportedClock);
        assert!(msg.contains("clock"));
    }
}
