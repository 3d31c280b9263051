//! Band-limited step synthesis buffer.
//!
//! Chip backends emit hard-edged step waveforms at their native clock
//! rate; converting those to an arbitrary output rate with naive
//! sample-and-hold aliases badly. This buffer records per-clock *deltas*
//! of the waveform convolved with a windowed-sinc kernel, then integrates
//! on read, producing a band-limited rendition at the output rate.
//!
//! The clock-to-sample mapping is fixed-point: `set_rates` rounds the
//! ratio up once, and `clocks_needed`/`end_frame` carry the fractional
//! position across frames, so the native-to-output sample ratio never
//! drifts no matter how each individual call rounds.

/// Fixed-point bits for clock-to-sample positions.
const TIME_BITS: u32 = 20;
const TIME_UNIT: u64 = 1 << TIME_BITS;

/// Kernel phase resolution.
const PHASE_BITS: u32 = 5;
const PHASE_COUNT: usize = 1 << PHASE_BITS;

/// Kernel taps on each side of the step center.
const HALF_WIDTH: usize = 8;
const WIDTH: usize = 2 * HALF_WIDTH;

/// Fixed-point scale of kernel coefficients and the integrator.
const DELTA_BITS: u32 = 14;
const DELTA_UNIT: i64 = 1 << DELTA_BITS;

/// High-pass leak shift: larger = slower DC removal.
const BASS_SHIFT: u32 = 9;

/// Kernel low-pass cutoff as a fraction of the output Nyquist.
const CUTOFF: f64 = 0.85;

/// A band-limited delta buffer for one output channel.
pub struct BlipBuf {
    /// Output samples per input clock, in TIME_BITS fixed point
    factor: u64,
    /// Fractional position of the next clock 0 within the output stream
    offset: u64,
    /// Completed output samples ready to read
    avail: usize,
    /// Delta accumulation buffer (integrated on read)
    buf: Vec<i64>,
    integrator: i64,
    hi_pass: bool,
    /// Windowed-sinc impulse per phase, rows summing exactly to DELTA_UNIT
    kernel: [[i32; WIDTH]; PHASE_COUNT],
}

impl BlipBuf {
    /// Create a buffer able to hold `size` output samples per frame.
    pub fn new(size: usize) -> Self {
        let mut blip = Self {
            factor: TIME_UNIT,
            offset: 0,
            avail: 0,
            buf: vec![0; size + WIDTH + 2],
            integrator: 0,
            hi_pass: false,
            kernel: build_kernel(),
        };
        blip.clear();
        blip
    }

    /// Set the clock (input) and sample (output) rates.
    ///
    /// The ratio is rounded up once so `clocks_needed` never asks for
    /// more clocks than the buffer can absorb.
    pub fn set_rates(&mut self, clock_rate: f64, sample_rate: f64) {
        let factor = TIME_UNIT as f64 * sample_rate / clock_rate;
        self.factor = factor as u64;
        if (self.factor as f64) < factor {
            self.factor += 1;
        }
    }

    /// Enable or disable DC high-pass filtering on read.
    pub fn set_dc(&mut self, hi_pass: bool) {
        self.hi_pass = hi_pass;
    }

    /// Grow capacity to `size` output samples per frame. Never shrinks.
    pub fn grow(&mut self, size: usize) {
        let needed = size + WIDTH + 2;
        if needed > self.buf.len() {
            self.buf.resize(needed, 0);
        }
    }

    /// Discard all buffered audio and reset the fractional position.
    pub fn clear(&mut self) {
        self.offset = self.factor / 2;
        self.avail = 0;
        self.integrator = 0;
        self.buf.fill(0);
    }

    /// Completed samples available to `read_samples`.
    pub fn samples_avail(&self) -> usize {
        self.avail
    }

    /// Clocks that must run for `samples` more output samples to complete.
    pub fn clocks_needed(&self, samples: usize) -> usize {
        let needed = (samples as u64) << TIME_BITS;
        if needed < self.offset {
            return 0;
        }
        ((needed - self.offset + self.factor - 1) / self.factor) as usize
    }

    /// Add a band-limited step of height `delta` at clock time `clock`
    /// within the current frame.
    pub fn add_delta(&mut self, clock: usize, delta: i32) {
        let fixed = self.offset + clock as u64 * self.factor;
        let pos = self.avail + (fixed >> TIME_BITS) as usize;
        let phase = ((fixed >> (TIME_BITS - PHASE_BITS)) as usize) & (PHASE_COUNT - 1);
        debug_assert!(pos + WIDTH <= self.buf.len(), "delta past buffer end");

        let taps = &self.kernel[phase];
        let d = delta as i64;
        for (i, &k) in taps.iter().enumerate() {
            self.buf[pos + i] += k as i64 * d;
        }
    }

    /// Add a linearly-interpolated (non-band-limited) step. Cheaper, used
    /// for the low-quality preview path.
    pub fn add_delta_fast(&mut self, clock: usize, delta: i32) {
        let fixed = self.offset + clock as u64 * self.factor;
        let pos = self.avail + (fixed >> TIME_BITS) as usize;
        let interp = ((fixed >> (TIME_BITS - DELTA_BITS)) & (DELTA_UNIT as u64 - 1)) as i64;
        debug_assert!(pos + 1 < self.buf.len(), "delta past buffer end");

        let d = delta as i64;
        self.buf[pos] += d * (DELTA_UNIT - interp);
        self.buf[pos + 1] += d * interp;
    }

    /// End a frame of `clocks` input clocks, making the corresponding
    /// output samples available.
    pub fn end_frame(&mut self, clocks: usize) {
        let off = self.offset + clocks as u64 * self.factor;
        self.avail += (off >> TIME_BITS) as usize;
        self.offset = off & (TIME_UNIT - 1);
        debug_assert!(self.avail + WIDTH + 2 <= self.buf.len() + 1, "frame overflow");
    }

    /// Read up to `out.len()` samples, removing them from the buffer.
    /// Returns how many were actually read.
    pub fn read_samples(&mut self, out: &mut [i16]) -> usize {
        let count = out.len().min(self.avail);

        let mut sum = self.integrator;
        for (i, slot) in out.iter_mut().take(count).enumerate() {
            sum += self.buf[i];
            let s = (sum >> DELTA_BITS).clamp(i16::MIN as i64, i16::MAX as i64);
            *slot = s as i16;
            if self.hi_pass {
                sum -= s << (DELTA_BITS - BASS_SHIFT);
            }
        }
        self.integrator = sum;

        self.buf.copy_within(count.., 0);
        let len = self.buf.len();
        self.buf[len - count..].fill(0);
        self.avail -= count;
        count
    }
}

fn build_kernel() -> [[i32; WIDTH]; PHASE_COUNT] {
    let mut kernel = [[0i32; WIDTH]; PHASE_COUNT];
    for (p, row) in kernel.iter_mut().enumerate() {
        let frac = p as f64 / PHASE_COUNT as f64;
        let mut values = [0f64; WIDTH];
        let mut sum = 0f64;
        for (i, v) in values.iter_mut().enumerate() {
            // tap position relative to the step center
            let x = i as f64 - (HALF_WIDTH as f64 - 1.0) - frac;
            let sinc = if x == 0.0 {
                CUTOFF
            } else {
                libm::sin(core::f64::consts::PI * CUTOFF * x) / (core::f64::consts::PI * x)
            };
            // Blackman window over [-HALF_WIDTH, HALF_WIDTH]
            let t = x / HALF_WIDTH as f64;
            let w = if t.abs() >= 1.0 {
                0.0
            } else {
                0.42 + 0.5 * libm::cos(core::f64::consts::PI * t)
                    + 0.08 * libm::cos(2.0 * core::f64::consts::PI * t)
            };
            *v = sinc * w;
            sum += *v;
        }
        // normalize so each phase passes DC exactly
        let mut acc = 0i64;
        for (i, v) in values.iter().enumerate() {
            let q = libm::round(v / sum * DELTA_UNIT as f64) as i64;
            row[i] = q as i32;
            acc += q;
        }
        // push rounding residue into the center tap
        row[HALF_WIDTH - 1] += (DELTA_UNIT - acc) as i32;
    }
    kernel
}
