use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use seastate_core::{SeaStateConfig, SurfaceSim, WaveInput, WaveInputConfig};
use std::time::Duration;

fn bench_surface_steps(c: &mut Criterion) {
    let mut group = c.benchmark_group("surface_step");
    let samples: usize = std::env::var("SEASTATE_BENCH_SAMPLES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(30);
    group.sample_size(samples);
    group.warm_up_time(Duration::from_secs(2));
    group.measurement_time(Duration::from_secs(5));

    let steps: usize = std::env::var("SEASTATE_BENCH_STEPS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(64);

    for &inputs in &[64_usize, 1024, 8192] {
        group.bench_function(format!("steps{steps}_inputs{inputs}"), |b| {
            b.iter_batched(
                || {
                    let config = SeaStateConfig {
                        history_capacity: 1,
                        ..SeaStateConfig::default()
                    };
                    let mut sim = SurfaceSim::new(config).expect("sim");
                    for seed in 0..inputs {
                        let input = WaveInput::new(WaveInputConfig {
                            max_displacement_vertical: (seed % 17) as f32 * 0.25,
                            max_displacement_horizontal: (seed % 5) as f32 * 0.5,
                            ..WaveInputConfig::default()
                        })
                        .expect("input");
                        sim.register_input(input);
                    }
                    sim
                },
                |mut sim| {
                    for _ in 0..steps {
                        sim.step();
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_surface_steps);
criterion_main!(benches);
