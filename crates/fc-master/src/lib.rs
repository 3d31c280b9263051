//! Headless playback controller for ferrochip.
//!
//! [`Player`] owns the engine behind one coarse lock and exposes the
//! two access flavors the rest of a host application needs: the
//! producer side ([`Player::produce`], called from an audio callback or
//! an export loop) and the mutator side ([`Player::lock_hard`] /
//! [`Player::lock_soft`] RAII guards for editors and UIs). It also
//! makes the end-of-song policy decision the engine itself leaves
//! open: loop at the walk-pass loop point, a fixed number of times, or
//! run to termination.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use fc_engine::{Scheduler, SongEnd};
use tracing::debug;

// Re-export what callers need so they don't depend on fc-ir/fc-engine
// directly.
pub use fc_engine::{HaltTarget, Warning, WarningLog};
pub use fc_ir::{PlaybackPosition, Song};

/// Exclusive engine access for destructive mutations. The producer is
/// guaranteed to be between buffers while this is held.
pub struct HardGuard<'a> {
    guard: MutexGuard<'a, Scheduler>,
}

impl std::ops::Deref for HardGuard<'_> {
    type Target = Scheduler;
    fn deref(&self) -> &Scheduler {
        &self.guard
    }
}

impl std::ops::DerefMut for HardGuard<'_> {
    fn deref_mut(&mut self) -> &mut Scheduler {
        &mut self.guard
    }
}

/// Same exclusion as [`HardGuard`], but flags best-effort intent: the
/// producer finishes its in-flight buffer and then yields, so brief
/// UI reads don't starve audio.
pub struct SoftGuard<'a> {
    guard: MutexGuard<'a, Scheduler>,
    pending: &'a AtomicBool,
}

impl Drop for SoftGuard<'_> {
    fn drop(&mut self) {
        self.pending.store(false, Ordering::Release);
    }
}

impl std::ops::Deref for SoftGuard<'_> {
    type Target = Scheduler;
    fn deref(&self) -> &Scheduler {
        &self.guard
    }
}

impl std::ops::DerefMut for SoftGuard<'_> {
    fn deref_mut(&mut self) -> &mut Scheduler {
        &mut self.guard
    }
}

/// What to do when playback reaches the end of the song.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPolicy {
    /// Keep looping at the song's own loop point forever
    Forever,
    /// Allow this many wraps, then stop
    Count(u32),
    /// First wrap (or terminal row) stops playback
    Once,
}

pub struct Player {
    engine: Arc<Mutex<Scheduler>>,
    soft_pending: Arc<AtomicBool>,
    policy: LoopPolicy,
}

impl Player {
    pub fn new(song: Song, sample_rate: u32, pool_size: usize) -> Self {
        Self {
            engine: Arc::new(Mutex::new(Scheduler::new(song, sample_rate, pool_size))),
            soft_pending: Arc::new(AtomicBool::new(false)),
            policy: LoopPolicy::Forever,
        }
    }

    pub fn set_loop_policy(&mut self, policy: LoopPolicy) {
        self.policy = policy;
    }

    // === Producer side ===

    /// Fill one interleaved stereo buffer. This is the only call meant
    /// for the audio/export thread; it takes the engine lock for the
    /// duration of the buffer and never blocks inside it.
    pub fn produce(&self, out: &mut [f32]) {
        {
            let mut engine = match self.engine.lock() {
                Ok(g) => g,
                Err(p) => p.into_inner(),
            };
            engine.produce_buffer(out);

            let allowed = match self.policy {
                LoopPolicy::Forever => u32::MAX,
                LoopPolicy::Count(n) => n,
                LoopPolicy::Once => 0,
            };
            if engine.is_playing() && engine.loops_done() > allowed {
                debug!(loops = engine.loops_done(), "loop budget spent, stopping");
                engine.stop();
            }
        }
        // a soft locker is waiting; let it in before the next buffer
        if self.soft_pending.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
    }

    // === Mutator side ===

    /// Block until the producer is between buffers, then hold the
    /// engine exclusively. For destructive changes (seek, song swaps,
    /// chip reconfiguration).
    pub fn lock_hard(&self) -> HardGuard<'_> {
        let guard = match self.engine.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        HardGuard { guard }
    }

    /// Same exclusion with best-effort intent, for quick reads.
    pub fn lock_soft(&self) -> SoftGuard<'_> {
        self.soft_pending.store(true, Ordering::Release);
        let guard = match self.engine.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        SoftGuard { guard, pending: &self.soft_pending }
    }

    // === Conveniences ===

    pub fn play(&self) {
        self.lock_hard().play();
    }

    pub fn stop(&self) {
        self.lock_hard().stop();
    }

    pub fn is_playing(&self) -> bool {
        self.lock_soft().is_playing()
    }

    pub fn position(&self) -> PlaybackPosition {
        self.lock_soft().position()
    }

    /// Replace the song. Playback stops; the engine is rebuilt with the
    /// same sample rate and pool size is reset to serial.
    pub fn set_song(&self, song: Song) {
        let mut guard = self.lock_hard();
        let rate = guard.out_rate();
        *guard = Scheduler::new(song, rate, 0);
    }

    /// Render a song offline, deterministically, without touching any
    /// live playback state. Stops at the song's end (or after one loop
    /// for looping songs) or at `max_frames`, whichever comes first.
    pub fn render_song(song: Song, sample_rate: u32, max_frames: usize) -> Vec<f32> {
        let loops_allowed = match fc_engine::walk_song(&song) {
            SongEnd::Terminates => 0,
            SongEnd::Loops { .. } => 1,
        };

        let mut engine = Scheduler::new(song, sample_rate, 0);
        engine.play();

        let mut rendered = Vec::new();
        let mut chunk = vec![0.0f32; 1024 * 2];
        while rendered.len() / 2 < max_frames {
            engine.produce_buffer(&mut chunk);
            rendered.extend_from_slice(&chunk);
            if !engine.is_playing() || engine.loops_done() > loops_allowed {
                break;
            }
        }
        rendered.truncate(max_frames * 2);
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_ir::{ChipEntry, ChipKind, Effect, Instrument, Note, Pattern};

    fn test_song(looping: bool) -> Song {
        let mut song = Song::new("t");
        song.chips.push(ChipEntry::new(ChipKind::Pulse));
        song.add_instrument(Instrument::new("lead"));

        let mut pattern = Pattern::new(4, 4);
        let cell = pattern.cell_mut(0, 0);
        cell.note = Note::On(57);
        cell.instrument = 1;
        if looping {
            pattern.cell_mut(3, 0).effects.push(Effect::OrderJump(0));
        }
        let idx = song.add_pattern(pattern);
        song.add_order(idx);
        song
    }

    fn init_logs() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    #[test]
    fn produce_fills_and_position_advances() {
        init_logs();
        let player = Player::new(test_song(false), 44100, 0);
        player.play();

        let mut out = vec![0.0f32; 2048];
        player.produce(&mut out);
        player.produce(&mut out);

        assert!(player.position().total_ticks > 0);
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn soft_lock_flags_intent_while_held() {
        let player = Player::new(test_song(false), 44100, 0);
        {
            let guard = player.lock_soft();
            assert!(player.soft_pending.load(Ordering::Acquire));
            assert_eq!(guard.position().total_ticks, 0);
        }
        assert!(!player.soft_pending.load(Ordering::Acquire));
    }

    #[test]
    fn hard_lock_allows_destructive_mutation() {
        let player = Player::new(test_song(false), 44100, 0);
        player.play();
        let mut out = vec![0.0f32; 2048];
        player.produce(&mut out);

        {
            let mut guard = player.lock_hard();
            guard.seek(0, 2);
        }
        assert_eq!(player.position().row, 2);
    }

    #[test]
    fn loop_policy_once_stops_after_first_wrap() {
        let mut player = Player::new(test_song(true), 44100, 0);
        player.set_loop_policy(LoopPolicy::Once);
        player.play();

        // 4 rows * 6 ticks * 735 samples = one pass; run a few passes
        let mut out = vec![0.0f32; 735 * 2];
        for _ in 0..40 {
            player.produce(&mut out);
        }
        assert!(!player.is_playing());
    }

    #[test]
    fn forever_policy_keeps_looping() {
        let player = Player::new(test_song(true), 44100, 0);
        player.play();
        let mut out = vec![0.0f32; 735 * 2];
        for _ in 0..80 {
            player.produce(&mut out);
        }
        assert!(player.is_playing());
        assert!(player.lock_soft().loops_done() >= 2);
    }

    #[test]
    fn offline_render_is_deterministic() {
        let a = Player::render_song(test_song(false), 44100, 8000);
        let b = Player::render_song(test_song(false), 44100, 8000);
        assert_eq!(a, b);
        assert!(a.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn offline_render_of_looping_song_stops() {
        // would render forever if the loop guard failed
        let out = Player::render_song(test_song(true), 44100, 44100 * 5);
        assert!(out.len() <= 44100 * 5 * 2);
        assert!(!out.is_empty());
    }

    #[test]
    fn set_song_swaps_under_hard_lock() {
        let player = Player::new(test_song(false), 44100, 0);
        player.play();
        let mut out = vec![0.0f32; 2048];
        player.produce(&mut out);

        player.set_song(test_song(true));
        assert_eq!(player.position().total_ticks, 0);
        assert!(!player.is_playing());
    }
}
