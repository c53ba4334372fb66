//! Core types shared across the seastate workspace.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};
use std::borrow::Cow;
use std::collections::VecDeque;
#[cfg(debug_assertions)]
use std::sync::atomic::AtomicBool;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

new_key_type! {
    /// Stable handle for wave inputs backed by a generational slot map.
    pub struct InputId;
}

/// Monotonic counter identifying one simulation step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Maximum displacement extents aggregated over one tick.
///
/// Every channel is a non-negative magnitude in world units; zero means no
/// input perturbed the surface along that channel.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DisplacementBounds {
    /// Largest horizontal displacement reported this tick.
    pub horizontal: f32,
    /// Largest vertical displacement reported this tick.
    pub vertical: f32,
    /// Reserved third channel aggregated with the same max rule.
    pub extra: f32,
}

impl DisplacementBounds {
    /// Bounds with every channel at zero.
    pub const ZERO: Self = Self {
        horizontal: 0.0,
        vertical: 0.0,
        extra: 0.0,
    };

    /// Whether no displacement was recorded on any channel.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.horizontal == 0.0 && self.vertical == 0.0 && self.extra == 0.0
    }

    /// Channel-wise maximum of two bounds.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self {
            horizontal: self.horizontal.max(other.horizontal),
            vertical: self.vertical.max(other.vertical),
            extra: self.extra.max(other.extra),
        }
    }
}

/// Shared accumulator tracking the per-tick maximum displacement extents
/// reported by wave inputs.
///
/// `report` may be called concurrently from any number of producer threads
/// within a tick. The driver calls `consume` exactly once per tick, after the
/// producers for that tick have joined; a report arriving strictly after
/// `consume` returns accumulates toward the next tick.
#[derive(Debug, Default)]
pub struct DisplacementAggregator {
    horizontal: AtomicU32,
    vertical: AtomicU32,
    extra: AtomicU32,
    #[cfg(debug_assertions)]
    consuming: AtomicBool,
}

impl DisplacementAggregator {
    /// Construct an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the displacement extents one producer expects to cause this
    /// tick. Negative and NaN inputs clamp to zero.
    pub fn report(&self, horizontal: f32, vertical: f32, extra: f32) {
        Self::raise(&self.horizontal, horizontal);
        Self::raise(&self.vertical, vertical);
        Self::raise(&self.extra, extra);
    }

    fn raise(channel: &AtomicU32, value: f32) {
        // f32::max returns the other operand for NaN, so NaN collapses to 0.
        let magnitude = value.max(0.0);
        if magnitude > 0.0 {
            // Non-negative IEEE-754 bit patterns sort like the values they
            // encode, so an integer fetch_max is a numeric max.
            channel.fetch_max(magnitude.to_bits(), Ordering::AcqRel);
        }
    }

    /// Return the aggregate for the finished tick and reset every channel to
    /// zero. Single consumer per tick by contract; debug builds assert that
    /// two consumers never overlap.
    #[must_use]
    pub fn consume(&self) -> DisplacementBounds {
        #[cfg(debug_assertions)]
        {
            let overlapping = self.consuming.swap(true, Ordering::AcqRel);
            debug_assert!(!overlapping, "displacement aggregator consumed from two drivers at once");
        }
        let bounds = DisplacementBounds {
            horizontal: f32::from_bits(self.horizontal.swap(0, Ordering::AcqRel)),
            vertical: f32::from_bits(self.vertical.swap(0, Ordering::AcqRel)),
            extra: f32::from_bits(self.extra.swap(0, Ordering::AcqRel)),
        };
        #[cfg(debug_assertions)]
        self.consuming.store(false, Ordering::Release);
        bounds
    }

    /// Read the running aggregate without resetting it.
    #[must_use]
    pub fn peek(&self) -> DisplacementBounds {
        DisplacementBounds {
            horizontal: f32::from_bits(self.horizontal.load(Ordering::Acquire)),
            vertical: f32::from_bits(self.vertical.load(Ordering::Acquire)),
            extra: f32::from_bits(self.extra.load(Ordering::Acquire)),
        }
    }
}

/// Errors raised when validating wave-input configuration.
#[derive(Debug, Error, PartialEq)]
pub enum InputConfigError {
    /// A magnitude field carried an infinite or NaN value.
    #[error("{field} must be finite, got {value}")]
    NonFiniteField { field: &'static str, value: f32 },
    /// A magnitude field carried a negative value.
    #[error("{field} must be non-negative, got {value}")]
    NegativeField { field: &'static str, value: f32 },
    /// Shape bounds corners are swapped along an axis.
    #[error("shape bounds min {axis} exceeds max ({min} > {max})")]
    InvertedShapeBounds { axis: char, min: f32, max: f32 },
    /// Shape bounds carried an infinite or NaN corner.
    #[error("shape bounds must be finite")]
    NonFiniteShapeBounds,
}

/// Resolved placement of a wave input within the LOD cascade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LodTargeting {
    /// Render only into the octave covering the given wavelength.
    Octave(f32),
    /// Render into every LOD after the ripple combine pass.
    AllLodsAfterCombine,
    /// Render into every LOD before the ripple combine pass.
    AllLodsBeforeCombine,
}

/// Authoring-facing configuration for a single wave input.
///
/// All fields are always present; fields gated by a mode flag are simply
/// ignored when that mode is off. Validated once at load time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WaveInputConfig {
    /// Restrict this input to the octave selected by `octave_wavelength`.
    /// When disabled the input renders into all LODs.
    pub filter_by_wavelength: bool,
    /// Wavelength in world units selecting the octave to render into.
    /// Meaningful only while filtering.
    pub octave_wavelength: f32,
    /// When not filtering, render into every LOD after dynamic ripples are
    /// combined into the surface. Useful for scaling waves without affecting
    /// ripples and wakes.
    pub render_after_combine: bool,
    /// Whether the input follows the horizontal motion of the surface
    /// beneath it rather than compensating for it.
    pub follow_horizontal_motion: bool,
    /// Largest vertical displacement this input expects to cause, used to
    /// size bounding-volume heights for the surface tiles.
    pub max_displacement_vertical: f32,
    /// Largest horizontal displacement this input expects to cause, used to
    /// size bounding-volume widths for the surface tiles.
    pub max_displacement_horizontal: f32,
    /// Derive the vertical bound from an attached shape's extent instead of
    /// relying on the configured constant alone.
    pub use_shape_bounds_for_vertical: bool,
}

impl Default for WaveInputConfig {
    fn default() -> Self {
        Self {
            filter_by_wavelength: false,
            octave_wavelength: 0.0,
            render_after_combine: true,
            follow_horizontal_motion: true,
            max_displacement_vertical: 0.0,
            max_displacement_horizontal: 0.0,
            use_shape_bounds_for_vertical: false,
        }
    }
}

impl WaveInputConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), InputConfigError> {
        Self::check_magnitude("octave_wavelength", self.octave_wavelength)?;
        Self::check_magnitude("max_displacement_vertical", self.max_displacement_vertical)?;
        Self::check_magnitude("max_displacement_horizontal", self.max_displacement_horizontal)?;
        Ok(())
    }

    fn check_magnitude(field: &'static str, value: f32) -> Result<(), InputConfigError> {
        if !value.is_finite() {
            return Err(InputConfigError::NonFiniteField { field, value });
        }
        if value < 0.0 {
            return Err(InputConfigError::NegativeField { field, value });
        }
        Ok(())
    }

    /// Resolve the mode flags into an explicit cascade placement.
    #[must_use]
    pub const fn lod_targeting(&self) -> LodTargeting {
        if self.filter_by_wavelength {
            LodTargeting::Octave(self.octave_wavelength)
        } else if self.render_after_combine {
            LodTargeting::AllLodsAfterCombine
        } else {
            LodTargeting::AllLodsBeforeCombine
        }
    }
}

/// Axis-aligned bounding box of a renderable shape attached to an input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ShapeBounds {
    min: [f32; 3],
    max: [f32; 3],
}

impl ShapeBounds {
    const AXES: [char; 3] = ['x', 'y', 'z'];

    /// Construct bounds from corner points, rejecting swapped or non-finite
    /// corners.
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Result<Self, InputConfigError> {
        for axis in 0..3 {
            if !min[axis].is_finite() || !max[axis].is_finite() {
                return Err(InputConfigError::NonFiniteShapeBounds);
            }
            if min[axis] > max[axis] {
                return Err(InputConfigError::InvertedShapeBounds {
                    axis: Self::AXES[axis],
                    min: min[axis],
                    max: max[axis],
                });
            }
        }
        Ok(Self { min, max })
    }

    /// Minimum corner.
    #[must_use]
    pub const fn min(&self) -> [f32; 3] {
        self.min
    }

    /// Maximum corner.
    #[must_use]
    pub const fn max(&self) -> [f32; 3] {
        self.max
    }

    /// Furthest vertical distance of this box from the given sea level.
    #[must_use]
    pub fn vertical_reach(&self, sea_level: f32) -> f32 {
        (sea_level - self.min[1])
            .abs()
            .max((sea_level - self.max[1]).abs())
    }
}

/// A displacement producer registered with the surface simulation.
///
/// Holds a validated configuration, an optional live shape used to derive the
/// vertical bound, and an active flag. Inactive inputs never report.
#[derive(Debug, Clone)]
pub struct WaveInput {
    config: WaveInputConfig,
    shape: Option<ShapeBounds>,
    active: bool,
}

impl WaveInput {
    /// Construct an input from a configuration, validating it first.
    pub fn new(config: WaveInputConfig) -> Result<Self, InputConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            shape: None,
            active: true,
        })
    }

    /// Attach shape bounds used for geometry-derived vertical reach.
    #[must_use]
    pub fn with_shape(mut self, shape: ShapeBounds) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Read-only access to the configuration.
    #[must_use]
    pub const fn config(&self) -> &WaveInputConfig {
        &self.config
    }

    /// Mutable access to the configuration (for hot edits).
    #[must_use]
    pub fn config_mut(&mut self) -> &mut WaveInputConfig {
        &mut self.config
    }

    /// Replace the attached shape bounds.
    pub fn set_shape(&mut self, shape: Option<ShapeBounds>) {
        self.shape = shape;
    }

    /// Currently attached shape bounds, if any.
    #[must_use]
    pub const fn shape(&self) -> Option<&ShapeBounds> {
        self.shape.as_ref()
    }

    /// Whether this input participates in the current tick.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Enable or disable the input without deregistering it.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Effective vertical bound, taking the larger of the configured constant
    /// and the attached shape's reach from sea level when enabled.
    #[must_use]
    pub fn max_displacement_vertical(&self, sea_level: f32) -> f32 {
        let mut vertical = self.config.max_displacement_vertical;
        if self.config.use_shape_bounds_for_vertical
            && let Some(shape) = &self.shape
        {
            vertical = vertical.max(shape.vertical_reach(sea_level));
        }
        vertical
    }

    /// Report this input's displacement extents for the current tick.
    /// Inactive inputs and inputs with no positive extent stay silent.
    /// Returns whether a report was made.
    pub fn report_displacement(
        &self,
        sea_level: f32,
        aggregator: &DisplacementAggregator,
    ) -> bool {
        if !self.active {
            return false;
        }
        let horizontal = self.config.max_displacement_horizontal;
        let vertical = self.max_displacement_vertical(sea_level);
        if horizontal > 0.0 || vertical > 0.0 {
            aggregator.report(horizontal, vertical, 0.0);
            return true;
        }
        false
    }
}

/// Registry of displacement producers owned by the simulation context.
///
/// Inputs register and deregister explicitly; handles stay stable across
/// removals of other inputs.
#[derive(Debug, Default)]
pub struct InputRegistry {
    inputs: SlotMap<InputId, WaveInput>,
}

impl InputRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an input, returning its handle.
    pub fn register(&mut self, input: WaveInput) -> InputId {
        self.inputs.insert(input)
    }

    /// Remove an input by handle, returning it when the handle was live.
    pub fn deregister(&mut self, id: InputId) -> Option<WaveInput> {
        self.inputs.remove(id)
    }

    /// Borrow an input.
    #[must_use]
    pub fn get(&self, id: InputId) -> Option<&WaveInput> {
        self.inputs.get(id)
    }

    /// Mutably borrow an input.
    #[must_use]
    pub fn get_mut(&mut self, id: InputId) -> Option<&mut WaveInput> {
        self.inputs.get_mut(id)
    }

    /// Whether the handle refers to a live input.
    #[must_use]
    pub fn contains(&self, id: InputId) -> bool {
        self.inputs.contains_key(id)
    }

    /// Number of registered inputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Whether no inputs are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Number of inputs that will report next tick.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inputs.values().filter(|input| input.is_active()).count()
    }

    /// Toggle an input in place. Returns `false` for stale handles.
    pub fn set_active(&mut self, id: InputId, active: bool) -> bool {
        match self.inputs.get_mut(id) {
            Some(input) => {
                input.set_active(active);
                true
            }
            None => false,
        }
    }

    /// Iterate over registered inputs with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (InputId, &WaveInput)> {
        self.inputs.iter()
    }
}

/// Errors that can occur when constructing the surface simulation.
#[derive(Debug, Error)]
pub enum SimError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for the surface simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeaStateConfig {
    /// Height of the undisturbed surface in world units.
    pub sea_level: f32,
    /// Edge length of one surface tile at the most detailed LOD.
    pub tile_extent: f32,
    /// Number of LOD rings in the tile cascade.
    pub lod_count: u32,
    /// Maximum number of recent tick summaries retained in-memory.
    pub history_capacity: usize,
    /// Interval (ticks) between persistence flushes. 0 disables persistence.
    pub persistence_interval: u32,
}

impl Default for SeaStateConfig {
    fn default() -> Self {
        Self {
            sea_level: 0.0,
            tile_extent: 32.0,
            lod_count: 7,
            history_capacity: 256,
            persistence_interval: 0,
        }
    }
}

impl SeaStateConfig {
    fn validate(&self) -> Result<(), SimError> {
        if !self.sea_level.is_finite() {
            return Err(SimError::InvalidConfig("sea_level must be finite"));
        }
        if !self.tile_extent.is_finite() || self.tile_extent <= 0.0 {
            return Err(SimError::InvalidConfig("tile_extent must be positive"));
        }
        if self.lod_count == 0 || self.lod_count > 16 {
            return Err(SimError::InvalidConfig("lod_count must be in 1..=16"));
        }
        if self.history_capacity == 0 {
            return Err(SimError::InvalidConfig("history_capacity must be non-zero"));
        }
        Ok(())
    }
}

/// Conservative bounding volume for one ring of surface tiles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TileVolume {
    /// LOD ring index, 0 = most detailed.
    pub lod: u32,
    /// Horizontal half-extent including the displacement margin.
    pub half_extent: f32,
    /// Lowest surface height the ring may contain.
    pub min_height: f32,
    /// Highest surface height the ring may contain.
    pub max_height: f32,
}

/// Events emitted after processing a simulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickEvents {
    pub tick: Tick,
    pub bounds: DisplacementBounds,
    pub inputs_reported: usize,
    pub persisted: bool,
}

/// Summary emitted to persistence hooks each tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub input_count: usize,
    pub inputs_reported: usize,
    pub bounds: DisplacementBounds,
}

/// Scalar metric sampled during persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: Cow<'static, str>,
    pub value: f64,
}

impl MetricSample {
    /// Creates a new metric sample.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Helper for `f32` values.
    #[must_use]
    pub fn from_f32(name: &'static str, value: f32) -> Self {
        Self::new(name, f64::from(value))
    }
}

/// Aggregate payload forwarded to persistence sinks.
#[derive(Debug, Clone)]
pub struct BoundsBatch {
    pub summary: TickSummary,
    pub metrics: Vec<MetricSample>,
}

/// Persistence sink invoked after each tick.
pub trait BoundsPersistence: Send {
    fn on_tick(&mut self, payload: &BoundsBatch);
}

/// No-op persistence sink.
#[derive(Debug, Default)]
pub struct NullPersistence;

impl BoundsPersistence for NullPersistence {
    fn on_tick(&mut self, _payload: &BoundsBatch) {}
}

/// Driver owning the aggregator, the producer registry, and tick bookkeeping.
///
/// Producers receive the aggregator by reference from this context; there is
/// no ambient global surface to report into.
pub struct SurfaceSim {
    config: SeaStateConfig,
    registry: InputRegistry,
    aggregator: DisplacementAggregator,
    tick: Tick,
    last_bounds: DisplacementBounds,
    history: VecDeque<TickSummary>,
    persistence: Box<dyn BoundsPersistence>,
}

impl SurfaceSim {
    /// Build a simulation with a no-op persistence sink.
    pub fn new(config: SeaStateConfig) -> Result<Self, SimError> {
        Self::with_persistence(config, Box::new(NullPersistence))
    }

    /// Build a simulation forwarding tick batches to the provided sink.
    pub fn with_persistence(
        config: SeaStateConfig,
        persistence: Box<dyn BoundsPersistence>,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            registry: InputRegistry::new(),
            aggregator: DisplacementAggregator::new(),
            tick: Tick::zero(),
            last_bounds: DisplacementBounds::ZERO,
            history: VecDeque::with_capacity(history_capacity),
            persistence,
        })
    }

    fn stage_report(&self) -> usize {
        let sea_level = self.config.sea_level;
        let aggregator = &self.aggregator;
        let inputs: Vec<&WaveInput> = self.registry.iter().map(|(_, input)| input).collect();
        inputs
            .par_iter()
            .map(|input| usize::from(input.report_displacement(sea_level, aggregator)))
            .sum()
    }

    fn stage_persistence(&mut self, tick: Tick, summary: &TickSummary) -> bool {
        let interval = self.config.persistence_interval;
        if interval == 0 || !tick.0.is_multiple_of(u64::from(interval)) {
            return false;
        }
        let metrics = vec![
            MetricSample::from_f32("max_horizontal", summary.bounds.horizontal),
            MetricSample::from_f32("max_vertical", summary.bounds.vertical),
            MetricSample::from_f32("max_extra", summary.bounds.extra),
        ];
        let batch = BoundsBatch {
            summary: *summary,
            metrics,
        };
        self.persistence.on_tick(&batch);
        true
    }

    /// Execute one simulation tick: gather reports from every active input in
    /// parallel, consume the aggregate, and record the summary.
    pub fn step(&mut self) -> TickEvents {
        let next_tick = self.tick.next();

        let inputs_reported = self.stage_report();
        // The parallel report stage has joined; the aggregate for this tick
        // is complete.
        let bounds = self.aggregator.consume();
        self.last_bounds = bounds;

        let summary = TickSummary {
            tick: next_tick,
            input_count: self.registry.len(),
            inputs_reported,
            bounds,
        };
        let persisted = self.stage_persistence(next_tick, &summary);

        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
        self.tick = next_tick;

        TickEvents {
            tick: next_tick,
            bounds,
            inputs_reported,
            persisted,
        }
    }

    /// Size conservative bounding volumes for every LOD ring using the most
    /// recently consumed displacement bounds. The `extra` channel pads both
    /// the horizontal margin and the vertical range.
    #[must_use]
    pub fn lod_volumes(&self) -> Vec<TileVolume> {
        let horizontal_margin = self.last_bounds.horizontal + self.last_bounds.extra;
        let vertical_margin = self.last_bounds.vertical + self.last_bounds.extra;
        (0..self.config.lod_count)
            .map(|lod| {
                let base_half_extent = self.config.tile_extent * 0.5 * (1u32 << lod) as f32;
                TileVolume {
                    lod,
                    half_extent: base_half_extent + horizontal_margin,
                    min_height: self.config.sea_level - vertical_margin,
                    max_height: self.config.sea_level + vertical_margin,
                }
            })
            .collect()
    }

    /// Register an input with the simulation, returning its handle.
    pub fn register_input(&mut self, input: WaveInput) -> InputId {
        self.registry.register(input)
    }

    /// Deregister an input by handle.
    pub fn deregister_input(&mut self, id: InputId) -> Option<WaveInput> {
        self.registry.deregister(id)
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &SeaStateConfig {
        &self.config
    }

    /// Mutable access to the configuration (for hot edits).
    #[must_use]
    pub fn config_mut(&mut self) -> &mut SeaStateConfig {
        &mut self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Bounds consumed on the most recent tick.
    #[must_use]
    pub const fn last_bounds(&self) -> DisplacementBounds {
        self.last_bounds
    }

    /// Read-only access to the input registry.
    #[must_use]
    pub fn registry(&self) -> &InputRegistry {
        &self.registry
    }

    /// Mutable access to the input registry.
    #[must_use]
    pub fn registry_mut(&mut self) -> &mut InputRegistry {
        &mut self.registry
    }

    /// The shared aggregator, for producers managed outside the registry.
    /// Out-of-band reports must land before the next `step` to count toward
    /// that tick.
    #[must_use]
    pub fn aggregator(&self) -> &DisplacementAggregator {
        &self.aggregator
    }

    /// Replace the persistence sink.
    pub fn set_persistence(&mut self, persistence: Box<dyn BoundsPersistence>) {
        self.persistence = persistence;
    }

    /// Iterate over retained tick summaries.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregator_starts_and_consumes_empty() {
        let aggregator = DisplacementAggregator::new();
        assert_eq!(aggregator.peek(), DisplacementBounds::ZERO);
        assert_eq!(aggregator.consume(), DisplacementBounds::ZERO);
    }

    #[test]
    fn report_takes_channelwise_max() {
        let aggregator = DisplacementAggregator::new();
        aggregator.report(3.0, 0.0, 0.25);
        aggregator.report(1.0, 5.0, 0.0);
        let bounds = aggregator.consume();
        assert_eq!(bounds.horizontal, 3.0);
        assert_eq!(bounds.vertical, 5.0);
        assert_eq!(bounds.extra, 0.25);
    }

    #[test]
    fn negative_and_nan_reports_clamp_to_zero() {
        let aggregator = DisplacementAggregator::new();
        aggregator.report(-4.0, f32::NAN, -0.0);
        assert_eq!(aggregator.consume(), DisplacementBounds::ZERO);

        aggregator.report(2.0, 2.0, 2.0);
        aggregator.report(-10.0, f32::NAN, -10.0);
        let bounds = aggregator.consume();
        assert_eq!(
            bounds,
            DisplacementBounds {
                horizontal: 2.0,
                vertical: 2.0,
                extra: 2.0
            }
        );
    }

    #[test]
    fn consume_resets_for_next_tick() {
        let aggregator = DisplacementAggregator::new();
        aggregator.report(1.5, 2.5, 3.5);
        let first = aggregator.consume();
        assert!(!first.is_zero());
        assert_eq!(aggregator.consume(), DisplacementBounds::ZERO);
    }

    #[test]
    fn reports_after_consume_accumulate_toward_next_tick() {
        let aggregator = DisplacementAggregator::new();
        aggregator.report(1.0, 1.0, 0.0);
        let _ = aggregator.consume();
        aggregator.report(0.5, 0.25, 0.0);
        let bounds = aggregator.consume();
        assert_eq!(bounds.horizontal, 0.5);
        assert_eq!(bounds.vertical, 0.25);
    }

    #[test]
    fn peek_does_not_reset() {
        let aggregator = DisplacementAggregator::new();
        aggregator.report(0.75, 0.0, 0.0);
        assert_eq!(aggregator.peek().horizontal, 0.75);
        assert_eq!(aggregator.consume().horizontal, 0.75);
    }

    #[test]
    fn bounds_max_is_channelwise() {
        let a = DisplacementBounds {
            horizontal: 3.0,
            vertical: 0.0,
            extra: 1.0,
        };
        let b = DisplacementBounds {
            horizontal: 1.0,
            vertical: 5.0,
            extra: 0.5,
        };
        let merged = a.max(b);
        assert_eq!(merged.horizontal, 3.0);
        assert_eq!(merged.vertical, 5.0);
        assert_eq!(merged.extra, 1.0);
    }

    #[test]
    fn lod_targeting_resolves_mode_flags() {
        let mut config = WaveInputConfig {
            filter_by_wavelength: true,
            octave_wavelength: 4.0,
            ..WaveInputConfig::default()
        };
        assert_eq!(config.lod_targeting(), LodTargeting::Octave(4.0));

        config.filter_by_wavelength = false;
        config.render_after_combine = true;
        assert_eq!(config.lod_targeting(), LodTargeting::AllLodsAfterCombine);

        config.render_after_combine = false;
        assert_eq!(config.lod_targeting(), LodTargeting::AllLodsBeforeCombine);
    }

    #[test]
    fn input_config_rejects_negative_and_non_finite_magnitudes() {
        let negative = WaveInputConfig {
            max_displacement_vertical: -1.0,
            ..WaveInputConfig::default()
        };
        assert_eq!(
            negative.validate(),
            Err(InputConfigError::NegativeField {
                field: "max_displacement_vertical",
                value: -1.0
            })
        );

        let infinite = WaveInputConfig {
            octave_wavelength: f32::INFINITY,
            ..WaveInputConfig::default()
        };
        assert!(matches!(
            infinite.validate(),
            Err(InputConfigError::NonFiniteField {
                field: "octave_wavelength",
                ..
            })
        ));

        assert!(WaveInputConfig::default().validate().is_ok());
    }

    #[test]
    fn shape_bounds_rejects_swapped_corners() {
        let result = ShapeBounds::new([0.0, 2.0, 0.0], [1.0, 1.0, 1.0]);
        assert_eq!(
            result,
            Err(InputConfigError::InvertedShapeBounds {
                axis: 'y',
                min: 2.0,
                max: 1.0
            })
        );
        assert_eq!(
            ShapeBounds::new([f32::NAN, 0.0, 0.0], [1.0, 1.0, 1.0]),
            Err(InputConfigError::NonFiniteShapeBounds)
        );
    }

    #[test]
    fn shape_bounds_vertical_reach_spans_both_corners() {
        let bounds = ShapeBounds::new([0.0, 6.0, 0.0], [1.0, 13.0, 1.0]).expect("bounds");
        assert_eq!(bounds.vertical_reach(10.0), 4.0);
        assert_eq!(bounds.vertical_reach(5.0), 8.0);
    }

    #[test]
    fn inactive_or_flat_inputs_stay_silent() {
        let aggregator = DisplacementAggregator::new();

        let flat = WaveInput::new(WaveInputConfig::default()).expect("input");
        assert!(!flat.report_displacement(0.0, &aggregator));

        let mut wavy = WaveInput::new(WaveInputConfig {
            max_displacement_vertical: 1.0,
            ..WaveInputConfig::default()
        })
        .expect("input");
        wavy.set_active(false);
        assert!(!wavy.report_displacement(0.0, &aggregator));

        assert_eq!(aggregator.consume(), DisplacementBounds::ZERO);
    }

    #[test]
    fn registry_allocates_unique_handles() {
        let mut registry = InputRegistry::new();
        let a = registry.register(WaveInput::new(WaveInputConfig::default()).expect("input"));
        let b = registry.register(WaveInput::new(WaveInputConfig::default()).expect("input"));
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(a));

        let removed = registry.deregister(a);
        assert!(removed.is_some());
        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(a));
        assert!(!registry.set_active(a, false), "stale handle must be rejected");
        assert!(registry.set_active(b, false));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn sim_config_validation_rejects_bad_values() {
        let bad_tile = SeaStateConfig {
            tile_extent: 0.0,
            ..SeaStateConfig::default()
        };
        assert!(SurfaceSim::new(bad_tile).is_err());

        let bad_lods = SeaStateConfig {
            lod_count: 0,
            ..SeaStateConfig::default()
        };
        assert!(SurfaceSim::new(bad_lods).is_err());

        let bad_history = SeaStateConfig {
            history_capacity: 0,
            ..SeaStateConfig::default()
        };
        assert!(SurfaceSim::new(bad_history).is_err());

        assert!(SurfaceSim::new(SeaStateConfig::default()).is_ok());
    }

    #[test]
    fn lod_volumes_pad_rings_by_consumed_bounds() {
        let config = SeaStateConfig {
            sea_level: 2.0,
            tile_extent: 8.0,
            lod_count: 3,
            ..SeaStateConfig::default()
        };
        let mut sim = SurfaceSim::new(config).expect("sim");
        sim.register_input(
            WaveInput::new(WaveInputConfig {
                max_displacement_vertical: 1.5,
                max_displacement_horizontal: 0.5,
                ..WaveInputConfig::default()
            })
            .expect("input"),
        );
        sim.step();

        let volumes = sim.lod_volumes();
        assert_eq!(volumes.len(), 3);
        assert_eq!(volumes[0].half_extent, 4.0 + 0.5);
        assert_eq!(volumes[1].half_extent, 8.0 + 0.5);
        assert_eq!(volumes[2].half_extent, 16.0 + 0.5);
        for volume in &volumes {
            assert_eq!(volume.min_height, 0.5);
            assert_eq!(volume.max_height, 3.5);
        }
    }

    #[test]
    fn history_is_capacity_bounded() {
        let config = SeaStateConfig {
            history_capacity: 4,
            ..SeaStateConfig::default()
        };
        let mut sim = SurfaceSim::new(config).expect("sim");
        for _ in 0..10 {
            sim.step();
        }
        let summaries: Vec<_> = sim.history().collect();
        assert_eq!(summaries.len(), 4);
        assert_eq!(summaries.first().map(|s| s.tick), Some(Tick(7)));
        assert_eq!(summaries.last().map(|s| s.tick), Some(Tick(10)));
    }

    #[test]
    fn tick_advances_sequentially() {
        assert_eq!(Tick::zero().next(), Tick(1));
        assert_eq!(Tick(41).next(), Tick(42));
    }
}
