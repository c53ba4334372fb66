use anyhow::Result;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use seastate_core::{
    InputId, SeaStateConfig, ShapeBounds, SurfaceSim, WaveInput, WaveInputConfig,
};
use seastate_storage::{SharedStorage, Storage};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const DEMO_TICKS: u64 = 600;

fn main() -> Result<()> {
    init_tracing();
    let config = load_config()?;
    let (mut sim, storage) = bootstrap_sim(config)?;
    let gust = seed_inputs(&mut sim)?;
    info!("Starting seastate surface simulation");

    let mut rng = SmallRng::seed_from_u64(0x5EA5_7A7E);
    for _ in 0..DEMO_TICKS {
        // The gust front re-samples its horizontal push every tick.
        if let Some(input) = sim.registry_mut().get_mut(gust) {
            input.config_mut().max_displacement_horizontal = rng.random_range(0.0..2.5);
        }

        let events = sim.step();
        if events.tick.0.is_multiple_of(120) {
            info!(
                tick = events.tick.0,
                reported = events.inputs_reported,
                horizontal = events.bounds.horizontal,
                vertical = events.bounds.vertical,
                "Aggregated displacement bounds",
            );
        }
    }

    let volumes = sim.lod_volumes();
    if let Some(widest) = volumes.last() {
        info!(
            lod = widest.lod,
            half_extent = widest.half_extent,
            min_height = widest.min_height,
            max_height = widest.max_height,
            "Outermost tile ring after final tick",
        );
    }

    report_analytics(&storage);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config() -> Result<SeaStateConfig> {
    if let Ok(path) = std::env::var("SEASTATE_CONFIG") {
        let raw = std::fs::read_to_string(&path)?;
        let config: SeaStateConfig = serde_json::from_str(&raw)?;
        info!(path = %path, "Loaded configuration override");
        return Ok(config);
    }
    Ok(SeaStateConfig {
        persistence_interval: 30,
        history_capacity: 600,
        ..SeaStateConfig::default()
    })
}

fn bootstrap_sim(config: SeaStateConfig) -> Result<(SurfaceSim, Arc<Mutex<Storage>>)> {
    let storage = Arc::new(Mutex::new(Storage::open("seastate.db")?));
    let persistence = SharedStorage::new(Arc::clone(&storage));
    let sim = SurfaceSim::with_persistence(config, Box::new(persistence))?;
    Ok((sim, storage))
}

fn seed_inputs(sim: &mut SurfaceSim) -> Result<InputId> {
    // Broad swell band rendered into the 16m octave.
    let swell = WaveInput::new(WaveInputConfig {
        filter_by_wavelength: true,
        octave_wavelength: 16.0,
        max_displacement_vertical: 1.2,
        max_displacement_horizontal: 0.8,
        ..WaveInputConfig::default()
    })?;
    sim.register_input(swell);

    // Moored platform; its hull bounds drive the vertical reach.
    let platform = WaveInput::new(WaveInputConfig {
        max_displacement_vertical: 0.5,
        use_shape_bounds_for_vertical: true,
        follow_horizontal_motion: false,
        ..WaveInputConfig::default()
    })?
    .with_shape(ShapeBounds::new([-6.0, -2.5, -6.0], [6.0, 3.0, 6.0])?);
    sim.register_input(platform);

    // Gust front pushing the surface sideways before the combine pass.
    let gust = WaveInput::new(WaveInputConfig {
        render_after_combine: false,
        max_displacement_horizontal: 0.1,
        ..WaveInputConfig::default()
    })?;
    Ok(sim.register_input(gust))
}

fn report_analytics(storage: &Arc<Mutex<Storage>>) {
    let Ok(mut guard) = storage.lock() else {
        warn!("storage mutex poisoned; skipping analytics");
        return;
    };
    if let Err(err) = guard.flush() {
        warn!(error = %err, "failed to flush storage before analytics");
        return;
    }
    match guard.latest_metrics(8) {
        Ok(metrics) => {
            for metric in metrics {
                info!(
                    tick = metric.tick,
                    name = %metric.name,
                    value = metric.value,
                    "Latest metric",
                );
            }
        }
        Err(err) => warn!(error = %err, "failed to read latest metrics"),
    }
    match guard.peak_swells(5) {
        Ok(peaks) => {
            for peak in peaks {
                info!(
                    tick = peak.tick,
                    vertical = peak.max_vertical,
                    horizontal = peak.max_horizontal,
                    "Peak swell",
                );
            }
        }
        Err(err) => warn!(error = %err, "failed to read peak swells"),
    }
}
