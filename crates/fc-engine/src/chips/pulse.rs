//! A 4-channel square/noise PSG.
//!
//! Three square channels with selectable duty plus one LFSR noise
//! channel. Output is unipolar (0..amp), so containers compensate DC
//! when high-pass filtering. Not a clone of any particular part; it is
//! the house chip that exercises the whole dispatch contract.

use fc_ir::{Command, CommandKind, RegisterWrite, PORTA_REACHED};

use crate::dispatch::{ChipConfig, ChipDispatch, InitError, OSC_BUF_LEN};
use crate::frequency::{note_freq, PITCH_STEPS_PER_SEMITONE};

const CHANNELS: usize = 4;
const NOISE_CH: usize = 3;

/// Default master clock (NTSC-family).
const DEFAULT_CLOCK: u32 = 1_789_772;

/// The chip renders one sample per 16 master clocks.
const CLOCK_DIV: u32 = 16;

/// Per-channel peak amplitude at volume 64. Four channels sum to
/// 24576, comfortably inside i16.
const AMP_SCALE: i32 = 96;

/// Duty cycle thresholds as a fraction of the phase accumulator:
/// 12.5%, 25%, 50%, 75%.
const DUTY_EDGE: [u32; 4] = [
    1 << 29,
    1 << 30,
    1 << 31,
    (1u32 << 31) + (1 << 30),
];

#[derive(Clone, Copy)]
struct Voice {
    /// Absolute pitch position in 1/256-semitone steps (note * 256)
    pos: i32,
    /// Fine pitch offset in the same unit, set by Pitch commands
    pitch: i32,
    gate: bool,
    vol: u8,
    duty: u8,
    phase: u32,
    inc: u32,
    lfsr: u16,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            pos: 60 * PITCH_STEPS_PER_SEMITONE,
            pitch: 0,
            gate: false,
            vol: 64,
            duty: 2,
            phase: 0,
            inc: 0,
            lfsr: 1,
        }
    }
}

pub struct PulseChip {
    clock: u32,
    rate: u32,
    voices: [Voice; CHANNELS],
    muted: [bool; CHANNELS],
    osc: Vec<[i16; OSC_BUF_LEN]>,
    osc_pos: usize,
    pool: Vec<RegisterWrite>,
}

impl PulseChip {
    pub fn new() -> Self {
        Self {
            clock: DEFAULT_CLOCK,
            rate: DEFAULT_CLOCK / CLOCK_DIV,
            voices: [Voice::default(); CHANNELS],
            muted: [false; CHANNELS],
            osc: vec![[0; OSC_BUF_LEN]; CHANNELS],
            osc_pos: 0,
            pool: Vec::new(),
        }
    }

    fn update_freq(&mut self, ch: usize) {
        let v = &mut self.voices[ch];
        let total = v.pos.saturating_add(v.pitch);
        let note = total.div_euclid(PITCH_STEPS_PER_SEMITONE);
        let fine = total.rem_euclid(PITCH_STEPS_PER_SEMITONE);
        let note = note.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        let freq = note_freq(note, fine) as u64; // 16.16 Hz

        // phase increment per native sample, as a 32-bit phase fraction
        v.inc = ((freq << 16) / self.rate as u64).min(u32::MAX as u64) as u32;

        // mirror what a period register would hold
        let period = (((self.rate as u64) << 16) / freq.max(1)).min(0xffff) as u16;
        self.pool.push(RegisterWrite { addr: (ch * 4) as u32, val: period });
    }

    fn write_vol(&mut self, ch: usize, vol: i32) {
        let vol = vol.clamp(0, 64) as u8;
        self.voices[ch].vol = vol;
        self.pool.push(RegisterWrite {
            addr: (ch * 4 + 2) as u32,
            val: vol as u16,
        });
    }
}

impl Default for PulseChip {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipDispatch for PulseChip {
    fn init(&mut self, cfg: &ChipConfig) -> Result<usize, InitError> {
        let clock = if cfg.clock == 0 { DEFAULT_CLOCK } else { cfg.clock };
        if !(100_000..=4_000_000).contains(&clock) {
            return Err(InitError::UnsupportedClock);
        }
        if cfg.flags != 0 {
            return Err(InitError::UnsupportedFlags);
        }
        self.clock = clock;
        self.rate = clock / CLOCK_DIV;
        self.reset();
        Ok(CHANNELS)
    }

    fn dispatch(&mut self, cmd: Command) -> i32 {
        let ch = cmd.chan as usize;
        if ch >= CHANNELS {
            return 0;
        }
        match cmd.kind {
            CommandKind::NoteOn => {
                let v = &mut self.voices[ch];
                v.pos = cmd.value * PITCH_STEPS_PER_SEMITONE;
                v.gate = true;
                v.phase = 0;
                self.update_freq(ch);
                if cmd.value2 >= 0 {
                    self.write_vol(ch, cmd.value2);
                }
            }
            CommandKind::NoteOff => {
                self.voices[ch].gate = false;
                self.pool.push(RegisterWrite { addr: (ch * 4 + 2) as u32, val: 0 });
            }
            CommandKind::Volume => self.write_vol(ch, cmd.value),
            CommandKind::Pitch => {
                self.voices[ch].pitch = cmd.value;
                self.update_freq(ch);
            }
            CommandKind::Legato => {
                self.voices[ch].pos = cmd.value * PITCH_STEPS_PER_SEMITONE;
                self.voices[ch].gate = true;
                self.update_freq(ch);
            }
            CommandKind::NotePorta => {
                let target = cmd.value2 * PITCH_STEPS_PER_SEMITONE;
                let speed = cmd.value.max(1);
                let v = &mut self.voices[ch];
                let reached = if v.pos < target {
                    v.pos = (v.pos + speed).min(target);
                    v.pos == target
                } else if v.pos > target {
                    v.pos = (v.pos - speed).max(target);
                    v.pos == target
                } else {
                    true
                };
                self.update_freq(ch);
                if reached {
                    return PORTA_REACHED;
                }
            }
            CommandKind::ChipParam => {
                // param 0: duty index
                if cmd.value == 0 {
                    self.voices[ch].duty = (cmd.value2.clamp(0, 3)) as u8;
                    self.pool.push(RegisterWrite {
                        addr: (ch * 4 + 3) as u32,
                        val: self.voices[ch].duty as u16,
                    });
                }
            }
            // no per-channel latching needed for the rest
            CommandKind::Instrument | CommandKind::PrePorta | CommandKind::Panning => {}
        }
        0
    }

    fn tick(&mut self, _sys_tick: bool) {}

    fn acquire(&mut self, out: &mut [&mut [i16]], len: usize) {
        for i in 0..len {
            let mut sum = 0i32;
            for ch in 0..CHANNELS {
                let v = &mut self.voices[ch];
                let sample = if v.gate && v.inc > 0 {
                    let (next, wrapped) = v.phase.overflowing_add(v.inc);
                    v.phase = next;
                    let high = if ch == NOISE_CH {
                        if wrapped {
                            // 15-bit LFSR, taps 0 and 1
                            let bit = (v.lfsr ^ (v.lfsr >> 1)) & 1;
                            v.lfsr = (v.lfsr >> 1) | (bit << 14);
                        }
                        v.lfsr & 1 == 0
                    } else {
                        v.phase < DUTY_EDGE[v.duty as usize]
                    };
                    if high {
                        v.vol as i32 * AMP_SCALE
                    } else {
                        0
                    }
                } else {
                    0
                };
                self.osc[ch][self.osc_pos] = sample as i16;
                if !self.muted[ch] {
                    sum += sample;
                }
            }
            self.osc_pos = (self.osc_pos + 1) % OSC_BUF_LEN;
            if let Some(line) = out.first_mut() {
                line[i] = sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            }
        }
    }

    fn reset(&mut self) {
        self.voices = [Voice::default(); CHANNELS];
        self.muted = [false; CHANNELS];
        for buf in &mut self.osc {
            *buf = [0; OSC_BUF_LEN];
        }
        self.osc_pos = 0;
        self.pool.clear();
    }

    fn native_rate(&self) -> u32 {
        self.rate
    }

    fn dc_off_required(&self) -> bool {
        true
    }

    fn mute_channel(&mut self, ch: usize, mute: bool) {
        if ch < CHANNELS {
            self.muted[ch] = mute;
        }
    }

    fn osc_buffer(&self, ch: usize) -> &[i16] {
        &self.osc[ch.min(CHANNELS - 1)]
    }

    fn register_pool(&mut self) -> &mut Vec<RegisterWrite> {
        &mut self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_chip() -> PulseChip {
        let mut chip = PulseChip::new();
        chip.init(&ChipConfig::default()).unwrap();
        chip
    }

    #[test]
    fn rejects_out_of_range_clock() {
        let mut chip = PulseChip::new();
        let cfg = ChipConfig { clock: 50_000, ..Default::default() };
        assert_eq!(chip.init(&cfg), Err(InitError::UnsupportedClock));
    }

    #[test]
    fn rejects_unknown_flags() {
        let mut chip = PulseChip::new();
        let cfg = ChipConfig { flags: 0x80, ..Default::default() };
        assert_eq!(chip.init(&cfg), Err(InitError::UnsupportedFlags));
    }

    #[test]
    fn note_on_produces_output() {
        let mut chip = ready_chip();
        chip.dispatch(Command::new(CommandKind::NoteOn, 0, 57, 64));

        let mut buf = [0i16; 512];
        chip.acquire(&mut [&mut buf], 512);
        assert!(buf.iter().any(|&s| s != 0));
    }

    #[test]
    fn note_off_silences() {
        let mut chip = ready_chip();
        chip.dispatch(Command::new(CommandKind::NoteOn, 0, 57, 64));
        chip.dispatch(Command::of(CommandKind::NoteOff, 0, 0));

        let mut buf = [0i16; 256];
        chip.acquire(&mut [&mut buf], 256);
        assert!(buf.iter().all(|&s| s == 0));
    }

    #[test]
    fn mute_drops_channel_from_mix() {
        let mut chip = ready_chip();
        chip.dispatch(Command::new(CommandKind::NoteOn, 0, 57, 64));
        chip.mute_channel(0, true);

        let mut buf = [0i16; 256];
        chip.acquire(&mut [&mut buf], 256);
        assert!(buf.iter().all(|&s| s == 0));

        // the osc view still shows the channel running
        assert!(chip.osc_buffer(0).iter().any(|&s| s != 0));
    }

    #[test]
    fn porta_reports_arrival() {
        let mut chip = ready_chip();
        chip.dispatch(Command::new(CommandKind::NoteOn, 0, 57, 64));

        // huge speed: one call reaches the target
        let r = chip.dispatch(Command::new(CommandKind::NotePorta, 0, 100_000, 60));
        assert_eq!(r, PORTA_REACHED);

        // already at target: still reports reached
        let r = chip.dispatch(Command::new(CommandKind::NotePorta, 0, 1, 60));
        assert_eq!(r, PORTA_REACHED);
    }

    #[test]
    fn porta_slides_incrementally() {
        let mut chip = ready_chip();
        chip.dispatch(Command::new(CommandKind::NoteOn, 0, 57, 64));

        let mut reached = 0;
        let mut calls = 0;
        while calls < 10_000 {
            calls += 1;
            if chip.dispatch(Command::new(CommandKind::NotePorta, 0, 16, 60)) == PORTA_REACHED {
                reached = calls;
                break;
            }
        }
        // 3 semitones at 16 steps per call = 48 calls
        assert_eq!(reached, 48);
    }

    #[test]
    fn register_pool_records_writes() {
        let mut chip = ready_chip();
        chip.register_pool().clear();
        chip.dispatch(Command::new(CommandKind::NoteOn, 0, 57, 64));
        assert!(!chip.register_pool().is_empty());
    }

    #[test]
    fn noise_channel_differs_from_square() {
        let mut chip = ready_chip();
        chip.dispatch(Command::new(CommandKind::NoteOn, NOISE_CH as u8, 57, 64));

        let mut buf = [0i16; 2048];
        chip.acquire(&mut [&mut buf], 2048);
        assert!(buf.iter().any(|&s| s != 0));

        // a square at this pitch has a period around 270 samples; noise
        // must not be that periodic
        let head = &buf[0..256];
        let shifted = &buf[271..527];
        assert_ne!(head, shifted);
    }

    #[test]
    fn reset_is_idempotent() {
        let mut chip = ready_chip();
        chip.dispatch(Command::new(CommandKind::NoteOn, 0, 57, 64));
        chip.reset();
        chip.reset();

        let mut buf = [0i16; 128];
        chip.acquire(&mut [&mut buf], 128);
        assert!(buf.iter().all(|&s| s == 0));
        assert!(chip.register_pool().is_empty());
    }

    #[test]
    fn unknown_chip_param_is_ignored() {
        let mut chip = ready_chip();
        let r = chip.dispatch(Command::new(CommandKind::ChipParam, 0, 99, 1));
        assert_eq!(r, 0);
    }
}
