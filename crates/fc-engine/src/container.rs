//! Per-chip render container.
//!
//! Owns one chip instance plus everything needed to turn its
//! native-rate output into output-rate audio: a band-limited delta
//! buffer per output line, the native-rate scratch buffers the chip
//! renders into, and the output-rate buffers the mixer reads. The
//! scheduler asks for output samples; the container works out how many
//! native clocks that takes and runs the chip for exactly that long.

use arrayvec::ArrayVec;
use fc_ir::{ChipEntry, Command, InsKey, RegisterWrite};

use crate::blip::BlipBuf;
use crate::chips::SilentChip;
use crate::dispatch::{chip_channels, create_chip, ChipConfig, ChipDispatch, MAX_OUTPUTS};
use crate::warn::WarningLog;

pub struct DispatchContainer {
    chip: Box<dyn ChipDispatch>,
    blips: ArrayVec<BlipBuf, MAX_OUTPUTS>,
    /// Native-rate scratch the chip renders into
    bb_in: ArrayVec<Vec<i16>, MAX_OUTPUTS>,
    /// Output-rate audio the mixer reads
    out: ArrayVec<Vec<i16>, MAX_OUTPUTS>,
    /// Last sample fed to each delta buffer
    prev: [i32; MAX_OUTPUTS],
    channels: usize,
    volume: u16,
    out_rate: u32,
    low_quality: bool,
    hi_pass: bool,
    /// Seed `prev` from the first rendered sample, so unipolar chips
    /// don't thump when the high-pass filter engages
    dc_comp_pending: bool,
    warned_underrun: bool,
    log: WarningLog,
}

impl DispatchContainer {
    /// Instantiate and initialize the chip a song entry asks for.
    ///
    /// If the backend refuses to init, a silent stand-in with the same
    /// channel count takes its place; playback continues, the song's
    /// channel numbering is unaffected, and a warning is logged.
    pub fn new(entry: &ChipEntry, out_rate: u32, log: WarningLog) -> Self {
        let cfg = ChipConfig {
            clock: entry.clock,
            sample_rate: out_rate,
            flags: 0,
        };
        let mut chip = create_chip(entry.kind);
        let channels = match chip.init(&cfg) {
            Ok(n) => n,
            Err(e) => {
                log.record(format!(
                    "chip {:?} failed to init ({e}), substituting silence",
                    entry.kind
                ));
                let fallback = chip_channels(entry.kind);
                chip = Box::new(SilentChip::with_channels(fallback));
                chip.init(&ChipConfig::default()).unwrap_or(fallback)
            }
        };

        let mut container = Self {
            chip,
            blips: ArrayVec::new(),
            bb_in: ArrayVec::new(),
            out: ArrayVec::new(),
            prev: [0; MAX_OUTPUTS],
            channels,
            volume: entry.volume,
            out_rate,
            low_quality: false,
            hi_pass: true,
            dc_comp_pending: false,
            warned_underrun: false,
            log,
        };
        for _ in 0..container.chip.output_count().min(MAX_OUTPUTS) {
            container.blips.push(BlipBuf::new(1024));
            container.bb_in.push(Vec::new());
            container.out.push(Vec::new());
        }
        container.apply_rates();
        container.arm_dc_comp();
        container
    }

    fn apply_rates(&mut self) {
        let native = self.chip.native_rate();
        for blip in &mut self.blips {
            blip.set_rates(native as f64, self.out_rate as f64);
            blip.set_dc(self.hi_pass);
            blip.clear();
        }
    }

    fn arm_dc_comp(&mut self) {
        self.dc_comp_pending = self.hi_pass && self.chip.dc_off_required();
    }

    /// Change the output sample rate. Discards buffered audio.
    pub fn set_rates(&mut self, out_rate: u32) {
        self.out_rate = out_rate;
        self.apply_rates();
    }

    /// Low quality swaps the windowed-sinc step for a two-tap
    /// interpolated one. Cheaper, audibly aliased.
    pub fn set_quality(&mut self, low_quality: bool) {
        self.low_quality = low_quality;
    }

    /// Enable or disable the output high-pass filter.
    pub fn set_hi_pass(&mut self, hi_pass: bool) {
        self.hi_pass = hi_pass;
        for blip in &mut self.blips {
            blip.set_dc(hi_pass);
        }
        self.arm_dc_comp();
    }

    /// Render `want` output samples into this container's out buffers
    /// starting at `offset`. The scheduler calls this once per tick
    /// slice, walking `offset` across the master buffer.
    pub fn fill_buf(&mut self, want: usize, offset: usize) {
        if want == 0 {
            return;
        }
        let runtotal = self.blips[0].clocks_needed(want);

        for line in &mut self.bb_in {
            if line.len() < runtotal {
                line.resize(runtotal, 0);
            }
        }
        {
            let mut lines: ArrayVec<&mut [i16], MAX_OUTPUTS> = self
                .bb_in
                .iter_mut()
                .map(|l| l.as_mut_slice())
                .collect();
            self.chip.acquire(&mut lines, runtotal);
        }

        if self.dc_comp_pending && runtotal > 0 {
            for (o, line) in self.bb_in.iter().enumerate() {
                self.prev[o] = line[0] as i32;
            }
            self.dc_comp_pending = false;
        }

        let end = offset + want;
        for (o, blip) in self.blips.iter_mut().enumerate() {
            blip.grow(want + 2);
            let mut prev = self.prev[o];
            for (c, &s) in self.bb_in[o][..runtotal].iter().enumerate() {
                let s = s as i32;
                if s != prev {
                    if self.low_quality {
                        blip.add_delta_fast(c, s - prev);
                    } else {
                        blip.add_delta(c, s - prev);
                    }
                    prev = s;
                }
            }
            self.prev[o] = prev;
            blip.end_frame(runtotal);

            let out = &mut self.out[o];
            if out.len() < end {
                out.resize(end, 0);
            }
            let got = blip.read_samples(&mut out[offset..end]);
            if got < want {
                // hold the last sample for one slot, then silence
                let last = if got > 0 { out[offset + got - 1] } else { 0 };
                out[offset + got] = last;
                out[offset + got + 1..end].fill(0);
                if !self.warned_underrun {
                    self.log.record(format!(
                        "resampler underrun ({got}/{want}), padding"
                    ));
                    self.warned_underrun = true;
                }
            }
        }
    }

    /// Output-rate audio for one line, as last filled.
    pub fn out_buf(&self, line: usize) -> &[i16] {
        &self.out[line]
    }

    pub fn output_count(&self) -> usize {
        self.blips.len()
    }

    /// Channels this chip contributes to the global map.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Mix volume from the song's chip entry (256 = unity).
    pub fn volume(&self) -> u16 {
        self.volume
    }

    pub fn dispatch(&mut self, cmd: Command) -> i32 {
        self.chip.dispatch(cmd)
    }

    pub fn tick(&mut self, sys_tick: bool) {
        self.chip.tick(sys_tick);
    }

    pub fn mute_channel(&mut self, ch: usize, mute: bool) {
        self.chip.mute_channel(ch, mute);
    }

    pub fn osc_buffer(&self, ch: usize) -> &[i16] {
        self.chip.osc_buffer(ch)
    }

    /// Drain register writes recorded since the last call.
    pub fn drain_registers(&mut self, into: &mut Vec<RegisterWrite>) {
        into.append(self.chip.register_pool());
    }

    pub fn notify_ins_changed(&mut self, ins: InsKey) {
        self.chip.notify_ins_changed(ins);
    }

    pub fn notify_wave_changed(&mut self, wave: u32) {
        self.chip.notify_wave_changed(wave);
    }

    pub fn notify_ins_deleted(&mut self, ins: InsKey) {
        self.chip.notify_ins_deleted(ins);
    }

    /// Return chip and resampler to initial state without reallocating.
    pub fn reset(&mut self) {
        self.chip.reset();
        for blip in &mut self.blips {
            blip.clear();
        }
        self.prev = [0; MAX_OUTPUTS];
        self.arm_dc_comp();
    }
}
