//! Note-to-frequency conversion for chip backends.
//!
//! Converts a note number plus a fine-pitch offset into a 16.16
//! fixed-point frequency in Hz. Chips turn that into whatever their
//! hardware wants (period registers, phase increments).

/// Note number of A-4 (440 Hz). Note 60 is C-5.
const REFERENCE_NOTE: i16 = 57;

/// A-4 in 16.16 fixed point.
const REFERENCE_FREQ: u64 = 440 << 16;

/// Fine-pitch resolution: pitch offsets are in 1/256ths of a semitone,
/// the same unit [`fc_ir::CommandKind::Pitch`] carries.
pub const PITCH_STEPS_PER_SEMITONE: i32 = 256;

/// Multipliers for 0-11 semitones, scaled by 65536 (16.16 fixed-point)
/// semitone_multiplier[n] = round(2^(n/12) * 65536)
const SEMITONE_MUL: [u32; 12] = [
    65536, // 0:  1.0
    69433, // 1:  2^(1/12)
    73562, // 2:  2^(2/12)
    77936, // 3:  2^(3/12)
    82570, // 4:  2^(4/12)
    87480, // 5:  2^(5/12)
    92682, // 6:  2^(6/12)
    98193, // 7:  2^(7/12)
    104032, // 8: 2^(8/12)
    110218, // 9: 2^(9/12)
    116772, // 10: 2^(10/12)
    123715, // 11: 2^(11/12)
];

/// Frequency of a note in 16.16 fixed-point Hz.
///
/// `pitch` is a fine offset in 1/256ths of a semitone (positive = up).
/// Fractional semitones interpolate linearly between table entries,
/// which is within 0.1 cent of exact over one step.
pub fn note_freq(note: i16, pitch: i32) -> u32 {
    // total offset from A-4 in 1/256th-semitone steps
    let steps = (note as i32 - REFERENCE_NOTE as i32) * PITCH_STEPS_PER_SEMITONE + pitch;

    let semis = steps.div_euclid(PITCH_STEPS_PER_SEMITONE);
    let frac = steps.rem_euclid(PITCH_STEPS_PER_SEMITONE) as u64;

    let octaves = semis.div_euclid(12);
    let remainder = semis.rem_euclid(12) as usize;

    let lo = SEMITONE_MUL[remainder] as u64;
    let hi = if remainder == 11 {
        // next entry is the octave: 2.0 in 16.16
        131072
    } else {
        SEMITONE_MUL[remainder + 1] as u64
    };
    let mul = lo + ((hi - lo) * frac) / PITCH_STEPS_PER_SEMITONE as u64;

    let freq = (REFERENCE_FREQ * mul) >> 16;
    if octaves >= 0 {
        let shifted = freq << octaves.min(15) as u32;
        shifted.min(u32::MAX as u64) as u32
    } else {
        (freq >> (-octaves).min(40) as u32) as u32
    }
}

/// Frequency of a note in whole Hz (rounded).
pub fn note_freq_hz(note: i16, pitch: i32) -> u32 {
    let f = note_freq(note, pitch);
    (f + (1 << 15)) >> 16
}
