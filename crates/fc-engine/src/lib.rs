//! Playback engine for ferrochip.
//!
//! Turns song data into PCM: the scheduler advances musical time, the
//! channel state machines emit chip-agnostic commands, chip backends
//! render at their native rates, and per-chip containers band-limit and
//! rate-convert everything into one mixed buffer.

mod blip;
mod channel;
pub mod chips;
mod container;
mod dispatch;
mod frequency;
mod pool;
pub mod scheduler;
mod warn;

pub use blip::BlipBuf;
pub use channel::{ChannelState, CommandSink, RowControl, MAX_TICK_COMMANDS};
pub use container::DispatchContainer;
pub use dispatch::{
    chip_channels, create_chip, ChipConfig, ChipDispatch, InitError, MAX_OUTPUTS, OSC_BUF_LEN,
};
pub use frequency::{note_freq, note_freq_hz, PITCH_STEPS_PER_SEMITONE};
pub use pool::{RenderPool, SharedContainers};
pub use scheduler::{walk_song, HaltTarget, Scheduler, SongEnd};
pub use warn::{Warning, WarningLog, WARNING_CAP};
