use seastate_core::{SeaStateConfig, SurfaceSim, WaveInput, WaveInputConfig};
use seastate_storage::{SharedStorage, Storage};
use std::{
    fs,
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};

#[test]
fn storage_persists_bounds_roundtrip() {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_micros();
    let path = std::env::temp_dir().join(format!(
        "seastate_storage_test_{}_{}.duckdb",
        std::process::id(),
        timestamp
    ));

    let path_str = path.to_str().expect("utf8 path");
    let storage = Arc::new(Mutex::new(
        Storage::with_thresholds(path_str, 1, 1).expect("storage"),
    ));
    let persistence = SharedStorage::new(Arc::clone(&storage));

    let config = SeaStateConfig {
        persistence_interval: 1,
        history_capacity: 32,
        ..SeaStateConfig::default()
    };

    {
        let mut sim = SurfaceSim::with_persistence(config, Box::new(persistence)).expect("sim");
        let input = WaveInput::new(WaveInputConfig {
            max_displacement_vertical: 1.5,
            max_displacement_horizontal: 0.75,
            ..WaveInputConfig::default()
        })
        .expect("input");
        sim.register_input(input);

        for _ in 0..5 {
            sim.step();
        }
    }

    let mut guard = storage.lock().expect("storage lock");
    guard.flush().expect("flush");

    let metrics = guard.latest_metrics(8).expect("latest metrics");
    assert!(!metrics.is_empty(), "expected persisted metrics");
    assert!(
        metrics
            .iter()
            .any(|m| m.name == "max_vertical" && (m.value - 1.5).abs() < 1e-9),
        "vertical bound should round-trip"
    );

    let peaks = guard.peak_swells(4).expect("peak swells query");
    assert!(
        peaks.len() <= 4,
        "peak swells should not exceed requested limit"
    );
    assert!(
        peaks
            .first()
            .is_some_and(|peak| (peak.max_vertical - 1.5).abs() < 1e-9),
        "widest tick should surface first"
    );

    drop(guard);
    let _ = fs::remove_file(&path);
}
