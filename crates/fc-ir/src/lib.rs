//! Core data types for the ferrochip engine.
//!
//! This crate defines the song/pattern data model the playback engine
//! consumes (read-only), the chip-agnostic command set it emits, and the
//! observability value types it exposes. The engine never mutates song
//! data, only indexes into it.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod command;
mod effects;
mod groove;
mod pattern;
mod register;
pub mod song;

pub use command::{Command, CommandKind, PORTA_REACHED};
pub use effects::Effect;
pub use groove::{GroovePattern, MAX_GROOVE_LEN};
pub use pattern::{Cell, Note, Pattern, MAX_EFFECT_COLS};
pub use register::{PlaybackPosition, RegisterWrite};
pub use song::{ChipEntry, ChipKind, InsKey, Instrument, Song, MAX_CHANNELS, MAX_CHIPS};
