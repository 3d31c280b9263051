use criterion::{black_box, criterion_group, criterion_main, Criterion};

use fc_engine::Scheduler;
use fc_ir::{ChipEntry, ChipKind, Effect, Instrument, Note, Pattern, Song};

/// Two pulse chips, busy pattern: notes, arps and vibrato on most rows.
fn bench_song() -> Song {
    let mut song = Song::new("bench");
    song.chips.push(ChipEntry::new(ChipKind::Pulse));
    song.chips.push(ChipEntry::new(ChipKind::Pulse));
    song.add_instrument(Instrument::new("a"));

    let mut pattern = Pattern::new(64, 8);
    for row in 0..64u16 {
        for chan in 0..8u8 {
            if (row as u8 + chan) % 4 == 0 {
                let cell = pattern.cell_mut(row, chan);
                cell.note = Note::On(45 + (row % 24) as u8);
                cell.instrument = 1;
                if chan % 2 == 0 {
                    cell.effects.push(Effect::Arpeggio { x: 4, y: 7 });
                } else {
                    cell.effects.push(Effect::Vibrato { rate: 4, depth: 8 });
                }
            }
        }
    }
    // loop forever so every iteration does real work
    pattern.cell_mut(63, 0).effects.push(Effect::OrderJump(0));
    let idx = song.add_pattern(pattern);
    song.add_order(idx);
    song
}

fn produce_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("produce_buffer");

    for &pool in &[0usize, 2] {
        let mut sched = Scheduler::new(bench_song(), 44100, pool);
        sched.play();
        let mut out = vec![0.0f32; 1024 * 2];
        group.bench_function(format!("1024_frames_pool_{pool}"), |b| {
            b.iter(|| {
                sched.produce_buffer(black_box(&mut out));
            })
        });
    }

    group.finish();
}

criterion_group!(benches, produce_buffer);
criterion_main!(benches);
