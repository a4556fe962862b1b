//! Criterion benchmarks for the [`EventRouter`] decision path.
//!
//! Every inbound event runs resolve → compare → arm inside the engine's single
//! actor task, so this path bounds how fast both event streams can be drained.
//!
//! Run with:
//! ```bash
//! cargo bench --package tm-obs-core --bench router_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tm_obs_core::{
    Command, Competition, DisplayMode, EventRouter, MappingTable, MatchState, SceneId,
    SyncDirections,
};

/// Builds a table with `fields` field scenes and every non-field direct mode.
fn build_table(fields: usize) -> MappingTable {
    let field_scenes = (0..fields).map(|i| SceneId::new(format!("Field {}", i + 1)));
    let direct = DisplayMode::ALL
        .into_iter()
        .filter(|mode| !mode.is_field_mode())
        .map(|mode| (SceneId::new(format!("Scene {mode}")), mode));
    MappingTable::from_lists(Competition::V5RC, field_scenes, direct)
        .expect("generated table must be valid")
}

fn bench_scene_change_with_echo(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_change_with_echo");
    for fields in [1usize, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(fields), &fields, |b, &fields| {
            let mut router = EventRouter::new(build_table(fields), SyncDirections::BOTH);
            let scenes = [SceneId::from("Field 1"), SceneId::new("Scene RANKINGS")];
            let mut i = 0usize;
            b.iter(|| {
                let scene = scenes[i % scenes.len()].clone();
                i += 1;
                let outcome = router.on_scene_changed(black_box(scene));
                if let Some(Command::SetDisplay { mode, field }) = outcome.command().cloned() {
                    black_box(router.on_display_changed(mode, field));
                }
            });
        });
    }
    group.finish();
}

fn bench_match_state_change(c: &mut Criterion) {
    let mut router = EventRouter::new(build_table(8), SyncDirections::BOTH);
    router.on_scene_changed(SceneId::from("Field 3"));
    let mut running = false;
    c.bench_function("match_state_change_active_field", |b| {
        b.iter(|| {
            running = !running;
            let state = if running {
                MatchState::Running
            } else {
                MatchState::Idle
            };
            black_box(router.on_match_state_changed(black_box(state), 2));
        });
    });
}

criterion_group!(benches, bench_scene_change_with_echo, bench_match_state_change);
criterion_main!(benches);
