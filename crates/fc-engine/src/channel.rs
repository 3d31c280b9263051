//! Per-channel playback state machine.
//!
//! One [`ChannelState`] per logical channel turns pattern cells and
//! ticks into chip-agnostic commands. Row processing latches effect
//! state; tick processing applies the continuous effects in a fixed
//! order (row delay, volume slide, vibrato, tremolo, portamento, note
//! cut, retrigger, arpeggio) and then composes every pitch contribution
//! into at most one Pitch command per tick, so chips never see
//! intermediate pitch states.

use fc_ir::{Cell, Command, CommandKind, Effect, Note, Song};
use tracing::warn;

/// Upper bound on commands the whole engine can emit in one tick.
pub const MAX_TICK_COMMANDS: usize = 256;

/// Bounded per-tick command queue.
pub type CommandSink = heapless::Vec<Command, MAX_TICK_COMMANDS>;

/// Sine quarter-wave expanded to 64 steps, amplitude 127.
const VIB_TABLE: [i8; 64] = [
    0, 12, 25, 37, 49, 60, 71, 81, 90, 98, 106, 112, 117, 122, 125, 126, //
    127, 126, 125, 122, 117, 112, 106, 98, 90, 81, 71, 60, 49, 37, 25, 12, //
    0, -12, -25, -37, -49, -60, -71, -81, -90, -98, -106, -112, -117, -122, -125, -126, //
    -127, -126, -125, -122, -117, -112, -106, -98, -90, -81, -71, -60, -49, -37, -25, -12,
];

/// Global row actions a cell can request. Channels write into this,
/// the scheduler merges and acts after the whole row is processed.
#[derive(Clone, Copy, Debug, Default)]
pub struct RowControl {
    /// 0Bxx: jump to this order position, row 0
    pub jump_order: Option<u8>,
    /// 0Dxx: advance to the next order, starting at this row
    pub next_order_row: Option<u8>,
    /// 09xx/0Fxx family: overwrite one groove entry
    pub set_groove: Option<(u8, u8)>,
    /// FFxx: halt playback at the end of this row
    pub stop: bool,
}

fn push(cmds: &mut CommandSink, cmd: Command) {
    if cmds.push(cmd).is_err() {
        warn!(chan = cmd.chan, kind = ?cmd.kind, "tick command queue full, dropping");
    }
}

pub struct ChannelState {
    /// Global channel index, stamped on every emitted command
    chan: u8,
    note: u8,
    ins: u8,
    volume: u8,
    key_on: bool,

    // effect memories (param 0 reuses the last nonzero value)
    porta_speed_mem: u8,
    tone_speed_mem: u8,
    vib_rate_mem: u8,
    vib_depth_mem: u8,
    trem_rate_mem: u8,
    trem_depth_mem: u8,

    // active-this-row state
    porta_dir: i32,
    vol_slide: i8,
    vib_active: bool,
    trem_active: bool,
    cut_at: Option<u8>,
    /// Re-trigger interval in ticks (0 = off)
    retrig_every: u8,
    delayed: Option<(u8, Cell)>,

    // tone portamento
    porta_target: Option<u8>,
    porta_done: bool,

    // one-shot semitone slide (E1xx/E2xx)
    semi_target: Option<i32>,
    semi_speed: i32,

    // oscillators
    vib_pos: u8,
    vib_dir: u8,
    vib_fine: u8,
    trem_pos: u8,

    // arpeggio (arp_speed 0 = use the song default)
    arp: (u8, u8),
    arp_speed: u8,
    arp_counter: u8,
    arp_stage: u8,
    arp_last: i32,

    // accumulated pitch offsets, 1/256 semitone
    pitch_static: i32,
    porta_acc: i32,
    pitch_sent: i32,

    legato: bool,
}

impl ChannelState {
    pub fn new(chan: u8) -> Self {
        Self {
            chan,
            note: 0,
            ins: 0,
            volume: 64,
            key_on: false,
            porta_speed_mem: 0,
            tone_speed_mem: 0,
            vib_rate_mem: 0,
            vib_depth_mem: 0,
            trem_rate_mem: 0,
            trem_depth_mem: 0,
            porta_dir: 0,
            vol_slide: 0,
            vib_active: false,
            trem_active: false,
            cut_at: None,
            retrig_every: 0,
            delayed: None,
            porta_target: None,
            porta_done: false,
            semi_target: None,
            semi_speed: 0,
            vib_pos: 0,
            vib_dir: 0,
            vib_fine: 15,
            trem_pos: 0,
            arp: (0, 0),
            arp_speed: 0,
            arp_counter: 0,
            arp_stage: 0,
            arp_last: 0,
            pitch_static: 0,
            porta_acc: 0,
            pitch_sent: 0,
            legato: false,
        }
    }

    /// Back to initial state (seek/stop). Effect memories survive a
    /// reset the way they survive a row; everything audible is cleared.
    pub fn reset(&mut self) {
        let chan = self.chan;
        let arp_speed = self.arp_speed;
        *self = Self::new(chan);
        self.arp_speed = arp_speed;
    }

    /// The scheduler saw [`fc_ir::PORTA_REACHED`] come back from this
    /// channel's NotePorta; stop sliding.
    pub fn note_porta_done(&mut self) {
        self.porta_done = true;
    }

    /// Process one pattern row (tick 0 of the row).
    ///
    /// `ticks_this_row` is the groove value for this row; a row delay
    /// of that many ticks or more never fires and is ignored.
    pub fn process_row(
        &mut self,
        cell: &Cell,
        song: &Song,
        ticks_this_row: u8,
        cmds: &mut CommandSink,
        ctl: &mut RowControl,
    ) {
        // per-row effects stop unless re-stated
        self.porta_dir = 0;
        self.vol_slide = 0;
        self.vib_active = false;
        self.trem_active = false;
        self.cut_at = None;
        self.retrig_every = 0;
        self.arp = (0, 0);
        self.delayed = None;

        for eff in &cell.effects {
            if let Effect::RowDelay(x) = *eff {
                if x == 0 {
                    continue;
                }
                if x >= ticks_this_row {
                    warn!(chan = self.chan, delay = x, "row delay past row length, ignored");
                    return;
                }
                self.delayed = Some((x, cell.clone()));
                return;
            }
        }

        self.apply_cell(cell, song, cmds, ctl);
    }

    /// Process one musical tick. Tick 0 is the row tick; continuous
    /// effects act from tick 1.
    pub fn process_tick(
        &mut self,
        tick: u8,
        song: &Song,
        cmds: &mut CommandSink,
        ctl: &mut RowControl,
    ) {
        // 1. row delay
        if let Some((when, cell)) = self.delayed.take() {
            if tick >= when {
                self.apply_cell(&cell, song, cmds, ctl);
            } else {
                self.delayed = Some((when, cell));
            }
        }

        // 2. volume slide
        if tick > 0 && self.vol_slide != 0 {
            let v = (self.volume as i32 + self.vol_slide as i32).clamp(0, 64);
            if v as u8 != self.volume {
                self.volume = v as u8;
                push(cmds, Command::of(CommandKind::Volume, self.chan, v));
            }
        }

        // 3. vibrato
        let mut vib = 0i32;
        if self.vib_active && self.vib_depth_mem > 0 {
            self.vib_pos = self.vib_pos.wrapping_add(self.vib_rate_mem) & 63;
            vib = VIB_TABLE[self.vib_pos as usize] as i32 * self.vib_depth_mem as i32 / 8;
            vib = vib * self.vib_fine.min(15) as i32 / 15;
            match self.vib_dir {
                1 => vib = vib.max(0),
                2 => vib = vib.min(0),
                _ => {}
            }
        }

        // 4. tremolo (modulates the sent volume, not the stored one)
        if self.trem_active && self.trem_depth_mem > 0 && tick > 0 {
            self.trem_pos = self.trem_pos.wrapping_add(self.trem_rate_mem) & 63;
            let depth = VIB_TABLE[self.trem_pos as usize] as i32 * self.trem_depth_mem as i32 / 64;
            let v = (self.volume as i32 + depth).clamp(0, 64);
            push(cmds, Command::of(CommandKind::Volume, self.chan, v));
        }

        // 5. portamento
        if tick > 0 {
            if let Some(target) = self.porta_target {
                if !self.porta_done {
                    let speed = self.tone_speed_mem as i32 * 4;
                    push(
                        cmds,
                        Command::new(CommandKind::NotePorta, self.chan, speed, target as i32),
                    );
                }
            } else if self.porta_dir != 0 {
                self.porta_acc += self.porta_dir * self.porta_speed_mem as i32 * 4;
            } else if let Some(target) = self.semi_target {
                if self.porta_acc < target {
                    self.porta_acc = (self.porta_acc + self.semi_speed).min(target);
                } else {
                    self.porta_acc = (self.porta_acc - self.semi_speed).max(target);
                }
                if self.porta_acc == target {
                    self.semi_target = None;
                }
            }
        }

        // 6. note cut
        if let Some(cut) = self.cut_at {
            if tick >= cut && self.key_on {
                push(cmds, Command::of(CommandKind::NoteOff, self.chan, 0));
                self.key_on = false;
                self.cut_at = None;
            }
        }

        // 7. retrigger
        if self.retrig_every != 0
            && tick > 0
            && tick % self.retrig_every == 0
            && self.key_on
        {
            push(
                cmds,
                Command::new(
                    CommandKind::NoteOn,
                    self.chan,
                    self.note as i32,
                    self.volume as i32,
                ),
            );
        }

        // 8. arpeggio
        if self.arp != (0, 0) && self.key_on {
            let speed = if self.arp_speed != 0 { self.arp_speed } else { song.arp_speed };
            self.arp_counter += 1;
            if self.arp_counter >= speed.max(1) {
                self.arp_counter = 0;
                self.arp_stage = (self.arp_stage + 1) % 3;
            }
            let offset = match self.arp_stage {
                1 => self.arp.0 as i32,
                2 => self.arp.1 as i32,
                _ => 0,
            };
            if offset != self.arp_last {
                push(
                    cmds,
                    Command::of(CommandKind::Legato, self.chan, self.note as i32 + offset),
                );
                self.arp_last = offset;
            }
        } else if self.arp_last != 0 {
            // arp ended away from the base note; snap back
            push(cmds, Command::of(CommandKind::Legato, self.chan, self.note as i32));
            self.arp_last = 0;
        }

        // compose every pitch source into one command
        let total = self.pitch_static + self.porta_acc + vib;
        if total != self.pitch_sent {
            push(cmds, Command::of(CommandKind::Pitch, self.chan, total));
            self.pitch_sent = total;
        }
    }

    fn apply_cell(
        &mut self,
        cell: &Cell,
        song: &Song,
        cmds: &mut CommandSink,
        ctl: &mut RowControl,
    ) {
        let mut tone_porta = false;

        for eff in &cell.effects {
            match *eff {
                Effect::None | Effect::RowDelay(_) => {}
                Effect::Arpeggio { x, y } => {
                    self.arp = (x, y);
                    self.arp_stage = 0;
                    self.arp_counter = 0;
                }
                Effect::PortaUp(s) => {
                    if s != 0 {
                        self.porta_speed_mem = s;
                    }
                    self.porta_dir = 1;
                }
                Effect::PortaDown(s) => {
                    if s != 0 {
                        self.porta_speed_mem = s;
                    }
                    self.porta_dir = -1;
                }
                Effect::TonePorta(s) => {
                    if s != 0 {
                        self.tone_speed_mem = s;
                    }
                    tone_porta = true;
                }
                Effect::Vibrato { rate, depth } => {
                    if rate != 0 {
                        self.vib_rate_mem = rate;
                    }
                    if depth != 0 {
                        self.vib_depth_mem = depth;
                    }
                    self.vib_active = true;
                }
                Effect::Tremolo { rate, depth } => {
                    if rate != 0 {
                        self.trem_rate_mem = rate;
                    }
                    if depth != 0 {
                        self.trem_depth_mem = depth;
                    }
                    self.trem_active = true;
                }
                Effect::Panning(p) => {
                    push(cmds, Command::of(CommandKind::Panning, self.chan, p as i32));
                }
                Effect::SetGroove { slot, ticks } => {
                    ctl.set_groove = Some((slot, ticks));
                }
                Effect::VolumeSlide(d) => self.vol_slide = d,
                Effect::OrderJump(o) => ctl.jump_order = Some(o),
                Effect::Retrigger(t) => self.retrig_every = t,
                Effect::NextOrder(r) => ctl.next_order_row = Some(r),
                Effect::ArpSpeed(s) => self.arp_speed = s.max(1),
                Effect::PortaUpSemi { semitones, speed } => {
                    self.semi_target = Some(self.porta_acc + semitones as i32 * 256);
                    self.semi_speed = (speed as i32 * 4).max(1);
                }
                Effect::PortaDownSemi { semitones, speed } => {
                    self.semi_target = Some(self.porta_acc - semitones as i32 * 256);
                    self.semi_speed = (speed as i32 * 4).max(1);
                }
                Effect::VibratoDir(d) => self.vib_dir = d,
                Effect::VibratoFine(f) => self.vib_fine = f,
                Effect::Pitch(p) => self.pitch_static = (p as i32 - 0x80) * 2,
                Effect::Legato(on) => self.legato = on,
                Effect::NoteCut(t) => self.cut_at = Some(t),
                Effect::Stop => ctl.stop = true,
                Effect::ChipParam { param, value } => {
                    push(
                        cmds,
                        Command::new(
                            CommandKind::ChipParam,
                            self.chan,
                            param as i32,
                            value as i32,
                        ),
                    );
                }
            }
        }

        match cell.note {
            Note::None => {
                // tone porta with no note keeps sliding to the old target
            }
            Note::Off => {
                push(cmds, Command::of(CommandKind::NoteOff, self.chan, 0));
                self.key_on = false;
                self.porta_target = None;
            }
            Note::On(n) => {
                if tone_porta && self.key_on {
                    self.porta_target = Some(n);
                    self.porta_done = false;
                    self.note = n;
                    push(cmds, Command::of(CommandKind::PrePorta, self.chan, 1));
                } else {
                    let mut vol = self.volume;
                    let mut skip = false;
                    if cell.instrument != 0 {
                        match song.instrument(cell.instrument) {
                            Some(ins) => {
                                self.ins = cell.instrument;
                                vol = ins.volume;
                                push(
                                    cmds,
                                    Command::of(
                                        CommandKind::Instrument,
                                        self.chan,
                                        cell.instrument as i32,
                                    ),
                                );
                                push(
                                    cmds,
                                    Command::new(
                                        CommandKind::ChipParam,
                                        self.chan,
                                        0,
                                        ins.duty as i32,
                                    ),
                                );
                            }
                            None => {
                                // a bad index silences instead of propagating
                                warn!(
                                    chan = self.chan,
                                    ins = cell.instrument,
                                    "unknown instrument, note skipped"
                                );
                                push(cmds, Command::of(CommandKind::NoteOff, self.chan, 0));
                                self.key_on = false;
                                skip = true;
                            }
                        }
                    }
                    if !skip {
                        self.note = n;
                        self.key_on = true;
                        self.volume = vol;
                        self.porta_target = None;
                        self.porta_done = false;
                        self.porta_acc = 0;
                        self.semi_target = None;
                        // a retrigger clears one-shot state even when the
                        // instrument is unchanged
                        self.vib_pos = 0;
                        self.trem_pos = 0;
                        if self.legato {
                            push(cmds, Command::of(CommandKind::Legato, self.chan, n as i32));
                        } else {
                            push(
                                cmds,
                                Command::new(CommandKind::NoteOn, self.chan, n as i32, vol as i32),
                            );
                        }
                    }
                }
            }
        }

        if let Some(v) = cell.volume {
            let v = v.min(64);
            self.volume = v;
            push(cmds, Command::of(CommandKind::Volume, self.chan, v as i32));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_ir::Instrument;

    fn song_with_ins() -> Song {
        let mut song = Song::new("t");
        let mut ins = Instrument::new("lead");
        ins.volume = 48;
        ins.duty = 1;
        song.add_instrument(ins);
        song
    }

    fn note_cell(note: u8, ins: u8) -> Cell {
        let mut c = Cell::default();
        c.note = Note::On(note);
        c.instrument = ins;
        c
    }

    fn kinds(cmds: &CommandSink) -> Vec<CommandKind> {
        cmds.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn note_trigger_uses_instrument_volume() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        ch.process_row(&note_cell(60, 1), &song, 6, &mut cmds, &mut ctl);

        let on = cmds.iter().find(|c| c.kind == CommandKind::NoteOn).unwrap();
        assert_eq!(on.value, 60);
        assert_eq!(on.value2, 48);
        assert!(kinds(&cmds).contains(&CommandKind::Instrument));
    }

    #[test]
    fn unknown_instrument_skips_the_note() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        ch.process_row(&note_cell(60, 9), &song, 6, &mut cmds, &mut ctl);
        assert!(!kinds(&cmds).contains(&CommandKind::NoteOn));
    }

    #[test]
    fn volume_column_overrides() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        let mut cell = note_cell(60, 1);
        cell.volume = Some(32);
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);

        let vol = cmds.iter().rev().find(|c| c.kind == CommandKind::Volume).unwrap();
        assert_eq!(vol.value, 32);
    }

    #[test]
    fn volume_slide_walks_each_tick() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        let mut cell = note_cell(60, 1);
        cell.effects.push(Effect::VolumeSlide(-4));
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);

        cmds.clear();
        ch.process_tick(1, &song, &mut cmds, &mut ctl);
        let vol = cmds.iter().find(|c| c.kind == CommandKind::Volume).unwrap();
        assert_eq!(vol.value, 44);

        cmds.clear();
        ch.process_tick(2, &song, &mut cmds, &mut ctl);
        let vol = cmds.iter().find(|c| c.kind == CommandKind::Volume).unwrap();
        assert_eq!(vol.value, 40);
    }

    #[test]
    fn tone_porta_emits_pre_porta_then_slides() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        ch.process_row(&note_cell(57, 1), &song, 6, &mut cmds, &mut ctl);

        let mut cell = note_cell(60, 0);
        cell.effects.push(Effect::TonePorta(8));
        cmds.clear();
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);
        assert!(kinds(&cmds).contains(&CommandKind::PrePorta));
        assert!(!kinds(&cmds).contains(&CommandKind::NoteOn));

        cmds.clear();
        ch.process_tick(1, &song, &mut cmds, &mut ctl);
        let porta = cmds.iter().find(|c| c.kind == CommandKind::NotePorta).unwrap();
        assert_eq!(porta.value, 32);
        assert_eq!(porta.value2, 60);

        // once the chip reports arrival, the slide stops
        ch.note_porta_done();
        cmds.clear();
        ch.process_tick(2, &song, &mut cmds, &mut ctl);
        assert!(!kinds(&cmds).contains(&CommandKind::NotePorta));
    }

    #[test]
    fn porta_up_accumulates_into_one_pitch_command() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        let mut cell = note_cell(60, 1);
        cell.effects.push(Effect::PortaUp(2));
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);

        cmds.clear();
        ch.process_tick(1, &song, &mut cmds, &mut ctl);
        let pitches: Vec<_> = cmds.iter().filter(|c| c.kind == CommandKind::Pitch).collect();
        assert_eq!(pitches.len(), 1);
        assert_eq!(pitches[0].value, 8);

        cmds.clear();
        ch.process_tick(2, &song, &mut cmds, &mut ctl);
        let p = cmds.iter().find(|c| c.kind == CommandKind::Pitch).unwrap();
        assert_eq!(p.value, 16);
    }

    #[test]
    fn vibrato_and_porta_compose_into_one_pitch() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        let mut cell = note_cell(60, 1);
        cell.effects.push(Effect::PortaUp(2));
        cell.effects.push(Effect::Vibrato { rate: 4, depth: 8 });
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);

        cmds.clear();
        ch.process_tick(1, &song, &mut cmds, &mut ctl);
        let pitches: Vec<_> = cmds.iter().filter(|c| c.kind == CommandKind::Pitch).collect();
        assert_eq!(pitches.len(), 1);
        // porta contributes 8, vibrato at pos 4 contributes 49*8/8 = 49
        assert_eq!(pitches[0].value, 8 + 49);
    }

    #[test]
    fn note_cut_sends_note_off_at_the_right_tick() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        let mut cell = note_cell(60, 1);
        cell.effects.push(Effect::NoteCut(3));
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);

        for tick in 1..3 {
            cmds.clear();
            ch.process_tick(tick, &song, &mut cmds, &mut ctl);
            assert!(!kinds(&cmds).contains(&CommandKind::NoteOff), "cut early at {tick}");
        }
        cmds.clear();
        ch.process_tick(3, &song, &mut cmds, &mut ctl);
        assert!(kinds(&cmds).contains(&CommandKind::NoteOff));
    }

    #[test]
    fn row_delay_defers_the_trigger() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        let mut cell = note_cell(60, 1);
        cell.effects.push(Effect::RowDelay(2));
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);
        assert!(!kinds(&cmds).contains(&CommandKind::NoteOn));

        cmds.clear();
        ch.process_tick(1, &song, &mut cmds, &mut ctl);
        assert!(!kinds(&cmds).contains(&CommandKind::NoteOn));

        cmds.clear();
        ch.process_tick(2, &song, &mut cmds, &mut ctl);
        assert!(kinds(&cmds).contains(&CommandKind::NoteOn));
    }

    #[test]
    fn row_delay_past_row_length_is_ignored() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        let mut cell = note_cell(60, 1);
        cell.effects.push(Effect::RowDelay(6));
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);

        for tick in 1..6 {
            cmds.clear();
            ch.process_tick(tick, &song, &mut cmds, &mut ctl);
            assert!(!kinds(&cmds).contains(&CommandKind::NoteOn));
        }
    }

    #[test]
    fn arpeggio_cycles_three_stages() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        let mut cell = note_cell(60, 1);
        cell.effects.push(Effect::Arpeggio { x: 4, y: 7 });
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);

        let mut seen = Vec::new();
        for tick in 1..=6 {
            cmds.clear();
            ch.process_tick(tick, &song, &mut cmds, &mut ctl);
            for c in cmds.iter().filter(|c| c.kind == CommandKind::Legato) {
                seen.push(c.value);
            }
        }
        assert_eq!(seen, vec![64, 67, 60, 64, 67, 60]);
    }

    #[test]
    fn retrigger_fires_on_schedule() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        let mut cell = note_cell(60, 1);
        cell.effects.push(Effect::Retrigger(2));
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);

        let mut retriggered = Vec::new();
        for tick in 1..6 {
            cmds.clear();
            ch.process_tick(tick, &song, &mut cmds, &mut ctl);
            if kinds(&cmds).contains(&CommandKind::NoteOn) {
                retriggered.push(tick);
            }
        }
        assert_eq!(retriggered, vec![2, 4]);
    }

    #[test]
    fn jump_effects_fill_row_control() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        let mut cell = Cell::default();
        cell.effects.push(Effect::OrderJump(3));
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);
        assert_eq!(ctl.jump_order, Some(3));

        let mut cell = Cell::default();
        cell.effects.push(Effect::NextOrder(8));
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);
        assert_eq!(ctl.next_order_row, Some(8));

        let mut cell = Cell::default();
        cell.effects.push(Effect::SetGroove { slot: 0, ticks: 4 });
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);
        assert_eq!(ctl.set_groove, Some((0, 4)));
    }

    #[test]
    fn legato_mode_changes_note_without_retrigger() {
        let song = song_with_ins();
        let mut ch = ChannelState::new(0);
        let mut cmds = CommandSink::new();
        let mut ctl = RowControl::default();

        ch.process_row(&note_cell(60, 1), &song, 6, &mut cmds, &mut ctl);

        let mut cell = note_cell(62, 0);
        cell.effects.push(Effect::Legato(true));
        cmds.clear();
        ch.process_row(&cell, &song, 6, &mut cmds, &mut ctl);
        assert!(kinds(&cmds).contains(&CommandKind::Legato));
        assert!(!kinds(&cmds).contains(&CommandKind::NoteOn));
    }
}
