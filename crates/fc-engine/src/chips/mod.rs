//! Chip backend implementations.

mod pulse;
mod silent;

pub use pulse::PulseChip;
pub use silent::SilentChip;
