//! A chip that produces silence.
//!
//! Two jobs: a placeholder entry in a song's chip lineup, and the
//! fallback the engine swaps in when a real backend fails `init`. In
//! that role it keeps the failed chip's channel count so the global
//! channel map stays intact.

use fc_ir::{Command, RegisterWrite};

use crate::dispatch::{ChipConfig, ChipDispatch, InitError, OSC_BUF_LEN};

pub struct SilentChip {
    channels: usize,
    rate: u32,
    osc: [i16; OSC_BUF_LEN],
    pool: Vec<RegisterWrite>,
}

impl SilentChip {
    pub fn new() -> Self {
        Self::with_channels(1)
    }

    /// A silent stand-in exposing `channels` channels.
    pub fn with_channels(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            rate: 44100,
            osc: [0; OSC_BUF_LEN],
            pool: Vec::new(),
        }
    }
}

impl Default for SilentChip {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipDispatch for SilentChip {
    fn init(&mut self, cfg: &ChipConfig) -> Result<usize, InitError> {
        self.rate = if cfg.sample_rate == 0 { 44100 } else { cfg.sample_rate };
        Ok(self.channels)
    }

    fn dispatch(&mut self, _cmd: Command) -> i32 {
        0
    }

    fn tick(&mut self, _sys_tick: bool) {}

    fn acquire(&mut self, out: &mut [&mut [i16]], len: usize) {
        for line in out.iter_mut() {
            for s in line[..len].iter_mut() {
                *s = 0;
            }
        }
    }

    fn reset(&mut self) {}

    fn native_rate(&self) -> u32 {
        self.rate
    }

    fn mute_channel(&mut self, _ch: usize, _mute: bool) {}

    fn osc_buffer(&self, _ch: usize) -> &[i16] {
        &self.osc
    }

    fn register_pool(&mut self) -> &mut Vec<RegisterWrite> {
        &mut self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_silence() {
        let mut chip = SilentChip::new();
        chip.init(&ChipConfig::default()).unwrap();

        let mut buf = [123i16; 64];
        chip.acquire(&mut [&mut buf], 64);
        assert!(buf.iter().all(|&s| s == 0));
    }

    #[test]
    fn keeps_requested_channel_count() {
        let mut chip = SilentChip::with_channels(6);
        assert_eq!(chip.init(&ChipConfig::default()).unwrap(), 6);
    }

    #[test]
    fn ignores_commands() {
        let mut chip = SilentChip::new();
        chip.init(&ChipConfig::default()).unwrap();
        let r = chip.dispatch(Command::of(fc_ir::CommandKind::NoteOn, 0, 60));
        assert_eq!(r, 0);
    }
}
