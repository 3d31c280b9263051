//! The master playback clock.
//!
//! The scheduler owns the order/row/tick cursor, the groove, virtual
//! tempo, the channel state machines and the chip containers. Its one
//! hot operation is [`Scheduler::produce_buffer`]: slice the requested
//! frame count at tick boundaries, render every container for each
//! slice (through the work pool), run the musical tick at each
//! boundary, and mix at the end. It never blocks and always fills the
//! whole buffer, even when stopped or halted.
//!
//! Timing is integer with carried remainders in two places: output
//! samples per nominal tick (so long-run tick rate is exact at any
//! sample rate), and the virtual-tempo accumulator (so fractional
//! tempos average out to exactly `num/den` nominal ticks per musical
//! tick, never off by more than one).

use std::sync::{Arc, Mutex};

use fc_ir::{
    Command, CommandKind, GroovePattern, InsKey, PlaybackPosition, RegisterWrite, Song,
    MAX_CHANNELS, PORTA_REACHED,
};
use tracing::{debug, warn};

use crate::channel::{ChannelState, CommandSink, RowControl};
use crate::container::DispatchContainer;
use crate::pool::{RenderPool, SharedContainers};
use crate::warn::WarningLog;

/// Where an armed halt request freezes time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltTarget {
    NextTick,
    NextRow,
    NextPattern,
    Breakpoint { order: u8, row: u16 },
}

/// Outcome of the pre-playback walk pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SongEnd {
    /// Playback revisits this position forever
    Loops { order: u8, row: u16 },
    /// Playback stops (stop effect or running off the order list)
    Terminates,
}

/// Follow the song's jump effects from the start and decide whether it
/// loops or terminates, without touching any playback state.
pub fn walk_song(song: &Song) -> SongEnd {
    let mut visited: Vec<Vec<bool>> = song
        .orders
        .iter()
        .map(|_| Vec::new())
        .collect();

    let mut order: usize = 0;
    let mut row: usize = 0;
    loop {
        if order >= song.orders.len() || order > u8::MAX as usize {
            return SongEnd::Terminates;
        }
        // a dangling order entry is terminal, same as during playback
        let Some(pattern) = song
            .orders
            .get(order)
            .and_then(|&p| song.patterns.get(p as usize))
        else {
            return SongEnd::Terminates;
        };
        let rows = pattern.rows as usize;
        if rows == 0 || row >= rows {
            order += 1;
            row = 0;
            continue;
        }
        if visited[order].is_empty() {
            visited[order] = vec![false; rows];
        }
        if visited[order][row] {
            return SongEnd::Loops { order: order as u8, row: row as u16 };
        }
        visited[order][row] = true;

        // collect jump effects across all channels of this row
        let mut ctl = RowControl::default();
        for cell in pattern.row(row as u16) {
            for eff in &cell.effects {
                match *eff {
                    fc_ir::Effect::OrderJump(o) => ctl.jump_order = Some(o),
                    fc_ir::Effect::NextOrder(r) => ctl.next_order_row = Some(r),
                    fc_ir::Effect::Stop => ctl.stop = true,
                    _ => {}
                }
            }
        }

        if ctl.stop {
            return SongEnd::Terminates;
        }
        if let Some(o) = ctl.jump_order {
            order = o as usize;
            row = 0;
        } else if let Some(r) = ctl.next_order_row {
            order += 1;
            row = r as usize;
        } else {
            row += 1;
        }
    }
}

pub struct Scheduler {
    song: Song,
    out_rate: u32,
    containers: SharedContainers,
    pool: RenderPool,
    channels: Vec<ChannelState>,
    /// Global channel index -> (container index, chip-local channel)
    chan_map: Vec<(usize, u8)>,

    // cursor
    order: u8,
    row: u16,
    tick: u8,
    ticks_this_row: u8,
    groove: GroovePattern,
    groove_idx: usize,
    total_ticks: u64,

    // nominal-tick timing (output samples per tick, remainder carried)
    spt: u32,
    spt_rem: u32,
    drift: u32,
    tick_remaining: usize,

    // virtual tempo
    virt_accum: u32,

    playing: bool,
    ended: bool,
    halted: bool,
    halt_armed: Option<HaltTarget>,
    loops_done: u32,
    song_end: SongEnd,

    pending_ctl: RowControl,
    cmds: CommandSink,
    log: WarningLog,
}

impl Scheduler {
    pub fn new(song: Song, out_rate: u32, pool_size: usize) -> Self {
        let log = WarningLog::new();

        let mut containers = Vec::new();
        let mut chan_map = Vec::new();
        for (ci, entry) in song.chips.iter().enumerate() {
            let container = DispatchContainer::new(entry, out_rate, log.clone());
            for local in 0..container.channels() {
                if chan_map.len() >= MAX_CHANNELS {
                    warn!("channel map full, excess chip channels unreachable");
                    break;
                }
                chan_map.push((ci, local as u8));
            }
            containers.push(Mutex::new(container));
        }
        let containers: SharedContainers = Arc::new(containers);
        let pool = RenderPool::new(pool_size, &containers);

        let channels = (0..chan_map.len())
            .map(|g| ChannelState::new(g as u8))
            .collect();

        let tick_hz = song.tick_hz.max(1);
        let groove = song.groove.clone();
        let ticks_this_row = groove.entry(0);
        let song_end = walk_song(&song);
        debug!(?song_end, channels = chan_map.len(), "scheduler ready");

        Self {
            spt: out_rate / tick_hz,
            spt_rem: out_rate % tick_hz,
            song,
            out_rate,
            containers,
            pool,
            channels,
            chan_map,
            order: 0,
            row: 0,
            tick: 0,
            ticks_this_row,
            groove,
            groove_idx: 0,
            total_ticks: 0,
            drift: 0,
            tick_remaining: 0,
            virt_accum: 0,
            playing: false,
            ended: false,
            halted: false,
            halt_armed: None,
            loops_done: 0,
            song_end,
            pending_ctl: RowControl::default(),
            cmds: CommandSink::new(),
            log,
        }
    }

    // === Transport ===

    pub fn play(&mut self) {
        self.playing = true;
        self.halted = false;
        self.ended = false;
    }

    /// Stop and rewind. Channels and chips are reset so no held note
    /// leaks into the next playback.
    pub fn stop(&mut self) {
        self.playing = false;
        self.seek(0, 0);
    }

    /// Move the cursor. Resets all channel state and re-initializes
    /// every chip; timing accumulators start fresh.
    pub fn seek(&mut self, order: u8, row: u16) {
        for ch in &mut self.channels {
            ch.reset();
        }
        for slot in self.containers.iter() {
            if let Ok(mut c) = slot.lock() {
                c.reset();
            }
        }
        self.order = order;
        self.row = row;
        self.tick = 0;
        self.groove_idx = 0;
        self.groove = self.song.groove.clone();
        self.ticks_this_row = self.groove.entry(0);
        self.total_ticks = 0;
        self.drift = 0;
        self.tick_remaining = 0;
        self.virt_accum = 0;
        self.ended = false;
        self.halted = false;
        self.pending_ctl = RowControl::default();
        self.cmds.clear();
    }

    pub fn is_playing(&self) -> bool {
        self.playing && !self.ended
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Arm a halt target; time freezes when it is reached, audio keeps
    /// draining.
    pub fn halt_at(&mut self, target: HaltTarget) {
        self.halt_armed = Some(target);
    }

    /// Disarm any halt target and unfreeze.
    pub fn resume(&mut self) {
        self.halt_armed = None;
        self.halted = false;
    }

    // === Observability ===

    pub fn position(&self) -> PlaybackPosition {
        PlaybackPosition {
            order: self.order,
            row: self.row,
            tick: self.tick,
            total_ticks: self.total_ticks,
        }
    }

    pub fn song(&self) -> &Song {
        &self.song
    }

    pub fn out_rate(&self) -> u32 {
        self.out_rate
    }

    pub fn song_end(&self) -> SongEnd {
        self.song_end
    }

    /// Times playback has wrapped back to an earlier position.
    pub fn loops_done(&self) -> u32 {
        self.loops_done
    }

    pub fn warnings(&self) -> &WarningLog {
        &self.log
    }

    pub fn containers(&self) -> &SharedContainers {
        &self.containers
    }

    /// Copy a channel's oscilloscope view into `out`.
    pub fn osc_buffer(&self, chan: usize, out: &mut Vec<i16>) {
        out.clear();
        if let Some(&(ci, local)) = self.chan_map.get(chan) {
            if let Ok(c) = self.containers[ci].lock() {
                out.extend_from_slice(c.osc_buffer(local as usize));
            }
        }
    }

    /// Drain register writes from every chip, in chip order.
    pub fn drain_registers(&mut self) -> Vec<RegisterWrite> {
        let mut writes = Vec::new();
        for slot in self.containers.iter() {
            if let Ok(mut c) = slot.lock() {
                c.drain_registers(&mut writes);
            }
        }
        writes
    }

    pub fn mute_channel(&mut self, chan: usize, mute: bool) {
        if let Some(&(ci, local)) = self.chan_map.get(chan) {
            if let Ok(mut c) = self.containers[ci].lock() {
                c.mute_channel(local as usize, mute);
            }
        }
    }

    pub fn set_quality(&mut self, low_quality: bool) {
        for slot in self.containers.iter() {
            if let Ok(mut c) = slot.lock() {
                c.set_quality(low_quality);
            }
        }
    }

    pub fn set_hi_pass(&mut self, hi_pass: bool) {
        for slot in self.containers.iter() {
            if let Ok(mut c) = slot.lock() {
                c.set_hi_pass(hi_pass);
            }
        }
    }

    // === Asset notifications (editor hooks) ===

    pub fn notify_ins_changed(&mut self, ins: InsKey) {
        for slot in self.containers.iter() {
            if let Ok(mut c) = slot.lock() {
                c.notify_ins_changed(ins);
            }
        }
    }

    pub fn notify_wave_changed(&mut self, wave: u32) {
        for slot in self.containers.iter() {
            if let Ok(mut c) = slot.lock() {
                c.notify_wave_changed(wave);
            }
        }
    }

    pub fn notify_ins_deleted(&mut self, ins: InsKey) {
        for slot in self.containers.iter() {
            if let Ok(mut c) = slot.lock() {
                c.notify_ins_deleted(ins);
            }
        }
    }

    /// Route one command to its chip, bypassing the channel state
    /// machine. This is the replay-producer entry point: an external
    /// recorded command stream can drive the chips directly.
    pub fn dispatch_command(&mut self, cmd: Command) -> i32 {
        match self.chan_map.get(cmd.chan as usize) {
            Some(&(ci, local)) => match self.containers[ci].lock() {
                Ok(mut c) => c.dispatch(cmd.on_chan(local)),
                Err(_) => 0,
            },
            None => {
                warn!(chan = cmd.chan, "command for unmapped channel dropped");
                0
            }
        }
    }

    // === Rendering ===

    /// Fill `out` (interleaved stereo f32) completely. Frames are
    /// sliced at tick boundaries; each slice is rendered on every
    /// container through the work pool, then everything is mixed once.
    pub fn produce_buffer(&mut self, out: &mut [f32]) {
        let frames = out.len() / 2;
        let mut pos = 0;
        while pos < frames {
            if self.tick_remaining == 0 {
                self.on_tick_boundary();
            }
            let slice = (frames - pos).min(self.tick_remaining);
            self.pool.render(&self.containers, slice, pos);
            self.tick_remaining -= slice;
            pos += slice;
        }
        self.mix(out, frames);
    }

    fn on_tick_boundary(&mut self) {
        if self.playing && !self.ended && !self.halted {
            self.nominal_tick();
        }
        self.tick_remaining = self.next_tick_len();
    }

    /// Output samples until the next nominal tick, remainder carried.
    fn next_tick_len(&mut self) -> usize {
        let mut len = self.spt as usize;
        self.drift += self.spt_rem;
        let tick_hz = self.song.tick_hz.max(1);
        if self.drift >= tick_hz {
            self.drift -= tick_hz;
            len += 1;
        }
        len.max(1)
    }

    /// One nominal tick: feed the virtual-tempo accumulator and run the
    /// musical ticks it releases, if any.
    fn nominal_tick(&mut self) {
        self.virt_accum += self.song.virt_tempo_num.max(1) as u32;
        let den = self.song.virt_tempo_den.max(1) as u32;

        if self.virt_accum < den {
            // sub-tick: chips still sequence, music stands still
            for slot in self.containers.iter() {
                if let Ok(mut c) = slot.lock() {
                    c.tick(false);
                }
            }
            return;
        }
        while self.virt_accum >= den {
            self.virt_accum -= den;
            self.musical_tick();
            if self.halted || self.ended {
                break;
            }
        }
    }

    fn musical_tick(&mut self) {
        if self.order as usize >= self.song.orders.len() {
            self.ended = true;
            self.playing = false;
            return;
        }

        // row tick: latch the new row on every channel
        if self.tick == 0 {
            self.process_row_all();
        }

        // continuous effects for every channel
        for ch in self.channels.iter_mut() {
            ch.process_tick(self.tick, &self.song, &mut self.cmds, &mut self.pending_ctl);
        }

        self.flush_commands();

        for slot in self.containers.iter() {
            if let Ok(mut c) = slot.lock() {
                c.tick(true);
            }
        }

        self.total_ticks += 1;
        self.tick += 1;
        if self.tick >= self.ticks_this_row.max(1) {
            self.advance_row();
        }

        // halt targets are checked after the tick completed
        if let Some(target) = self.halt_armed {
            let reached = match target {
                HaltTarget::NextTick => true,
                HaltTarget::NextRow => self.tick == 0,
                HaltTarget::NextPattern => self.tick == 0 && self.row == 0,
                HaltTarget::Breakpoint { order, row } => {
                    self.tick == 0 && self.order == order && self.row == row
                }
            };
            if reached {
                self.halted = true;
                self.halt_armed = None;
                debug!(order = self.order, row = self.row, "halt target reached");
            }
        }
    }

    fn process_row_all(&mut self) {
        // a cursor past the pattern end (0Dxx with a large row target,
        // seek) skips forward; whatever row it lands on must still be
        // latched this tick, never dropped
        loop {
            let rows = self
                .song
                .orders
                .get(self.order as usize)
                .and_then(|&p| self.song.patterns.get(p as usize))
                .map(|p| p.rows);
            let Some(rows) = rows else {
                self.log
                    .record_at("order points at a missing pattern", Some(self.position()));
                self.ended = true;
                self.playing = false;
                return;
            };
            if self.row >= rows {
                self.advance_row();
                if self.ended {
                    return;
                }
                continue;
            }
            break;
        }

        let ticks = self.ticks_this_row;
        let song = &self.song;
        let pattern = song
            .orders
            .get(self.order as usize)
            .and_then(|&p| song.patterns.get(p as usize));
        let Some(pattern) = pattern else {
            return;
        };
        for (g, ch) in self.channels.iter_mut().enumerate() {
            if g >= pattern.channels as usize {
                break;
            }
            let cell = pattern.cell(self.row, g as u8);
            ch.process_row(cell, song, ticks, &mut self.cmds, &mut self.pending_ctl);
        }
    }

    fn flush_commands(&mut self) {
        for i in 0..self.cmds.len() {
            let cmd = self.cmds[i];
            let Some(&(ci, local)) = self.chan_map.get(cmd.chan as usize) else {
                continue;
            };
            let r = match self.containers[ci].lock() {
                Ok(mut c) => c.dispatch(cmd.on_chan(local)),
                Err(_) => 0,
            };
            if cmd.kind == CommandKind::NotePorta && r == PORTA_REACHED {
                self.channels[cmd.chan as usize].note_porta_done();
            }
        }
        self.cmds.clear();
    }

    fn advance_row(&mut self) {
        self.tick = 0;
        let ctl = core::mem::take(&mut self.pending_ctl);

        if let Some((slot, ticks)) = ctl.set_groove {
            self.groove.set_entry(slot as usize, ticks);
        }

        if ctl.stop {
            self.ended = true;
            self.playing = false;
            return;
        }

        let (new_order, new_row) = if let Some(o) = ctl.jump_order {
            (o as u16, 0u16)
        } else if let Some(r) = ctl.next_order_row {
            (self.order as u16 + 1, r as u16)
        } else {
            let rows = self.song.pattern_rows(self.order);
            if self.row + 1 >= rows {
                (self.order as u16 + 1, 0)
            } else {
                (self.order as u16, self.row + 1)
            }
        };

        // a backward move is a loop
        if new_order < self.order as u16
            || (new_order == self.order as u16 && new_row <= self.row)
        {
            self.loops_done += 1;
        }

        // the order cursor is 8-bit; entries past that are unreachable
        if new_order > u8::MAX as u16 || new_order as usize >= self.song.orders.len() {
            self.ended = true;
            self.playing = false;
            return;
        }

        self.order = new_order as u8;
        self.row = new_row;
        self.groove_idx += 1;
        self.ticks_this_row = self.groove.entry(self.groove_idx);
    }

    fn mix(&mut self, out: &mut [f32], frames: usize) {
        for s in out[..frames * 2].iter_mut() {
            *s = 0.0;
        }
        for slot in self.containers.iter() {
            let Ok(c) = slot.lock() else { continue };
            let vol = c.volume() as f32 / 256.0;
            let outputs = c.output_count();
            for o in 0..outputs {
                let buf = c.out_buf(o);
                for i in 0..frames.min(buf.len()) {
                    let v = buf[i] as f32 * vol / 32768.0;
                    if outputs == 1 {
                        out[i * 2] += v;
                        out[i * 2 + 1] += v;
                    } else if o == 0 {
                        out[i * 2] += v;
                    } else {
                        out[i * 2 + 1] += v;
                    }
                }
            }
        }
    }
}
