#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core cell-balancing logic (hardware-agnostic).
//!
//! This crate provides the hardware-independent balancing engine for a
//! multi-cell charger. All hardware interactions go through the
//! `balancer_traits::VoltageSource`, `balancer_traits::SwitchDriver` and
//! `balancer_traits::CellModel` traits.
//!
//! ## Architecture
//!
//! - **Stability gating**: decisions wait until every channel has settled
//! - **Voltage presumption**: sag-compensated no-load voltage estimates
//! - **Pattern computation**: hysteresis thresholds around the lowest cell
//! - **Attempt lifecycle**: baseline capture, hold, re-evaluate, timeout
//! - **Current bounds**: per-cell model queries for the outer charge loop
//!
//! ## Fixed-Point Arithmetic
//!
//! Internals operate in **millivolts** and **milliamps** using `i32` for
//! deterministic behavior; float config values are quantized once at build
//! time. See `util::quantize_to_mv_i32`.

pub mod error;
pub mod mocks;
pub mod util;

use crate::error::{BalancerError, BuildError, Result};
use balancer_traits::clock::{Clock, MonotonicClock};
use balancer_traits::{CellModel, MAX_CELLS, SwitchDriver, VoltageSource};
use eyre::WrapErr;
use std::sync::Arc;
use std::time::Instant;

use crate::util::{half_round_up, quantize_to_ma_i32, quantize_to_mv_i32};

/// Public status of a single tick of the balancing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceStatus {
    /// Keep ticking; waiting for stability or an attempt is in flight.
    Running,
    /// Controller is powered off; nothing left to do.
    Complete,
}

/// Balancing configuration.
#[derive(Debug, Clone)]
pub struct BalanceCfg {
    /// Cells closer than this to the lowest cell count as balanced (volts).
    pub error_margin_v: f32,
    /// Hard cap on a single balancing attempt before the pattern is
    /// re-derived from fresh baselines (milliseconds).
    pub max_balance_ms: u64,
    /// Charger current capability; seeds the min/max prediction folds (amps).
    pub max_charge_a: f32,
}

impl Default for BalanceCfg {
    fn default() -> Self {
        Self {
            error_margin_v: 0.010,
            max_balance_ms: 30_000,
            max_charge_a: 5.0,
        }
    }
}

/// Unified core for both dynamic (boxed) and generic (static dispatch) variants.
pub struct BalancerCore<V: VoltageSource, W: SwitchDriver, M: CellModel> {
    source: V,
    switches: W,
    models: [M; MAX_CELLS],
    cfg: BalanceCfg,
    cell_count: usize,
    // Unified clock for deterministic time in tests
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    // Epoch Instant for computing monotonic milliseconds
    epoch: Instant,

    // Desired bleed-switch states, bit c = cell c. Non-zero iff an attempt
    // is active; bits at or above cell_count stay clear.
    pattern: u8,
    powered: bool,
    // Whether on-load voltages were captured for the current attempt
    von_captured: bool,
    // Reference cell: lowest voltage at attempt start, never bled
    min_cell: usize,
    // Baselines per cell (millivolts): last no-load / on-load samples
    v_off: [i32; MAX_CELLS],
    v_on: [i32; MAX_CELLS],
    attempt_start_ms: u64,
    last_change_ms: u64,

    // Cached quantized config (millivolts / milliamps)
    error_margin_mv: i32,
    half_margin_mv: i32,
    max_charge_ma: i32,
}

impl<V: VoltageSource, W: SwitchDriver, M: CellModel> core::fmt::Debug for BalancerCore<V, W, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BalancerCore")
            .field("cell_count", &self.cell_count)
            .field("pattern", &format_args!("{:#08b}", self.pattern))
            .field("powered", &self.powered)
            .field("min_cell", &self.min_cell)
            .finish()
    }
}

impl<V: VoltageSource, W: SwitchDriver, M: CellModel> BalancerCore<V, W, M> {
    /// Number of configured cells.
    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    /// Current bleed-switch pattern, bit c = cell c.
    pub fn pattern(&self) -> u8 {
        self.pattern
    }

    /// Index of the reference cell chosen at the start of the current attempt.
    pub fn min_cell(&self) -> usize {
        self.min_cell
    }

    /// Return the configured balancing parameters.
    pub fn balance_cfg(&self) -> &BalanceCfg {
        &self.cfg
    }

    pub fn is_powered_on(&self) -> bool {
        self.powered
    }

    /// Milliseconds since the current balancing attempt started.
    pub fn balance_time_ms(&self) -> u64 {
        self.now_ms().saturating_sub(self.attempt_start_ms)
    }

    /// Milliseconds since the switch pattern last changed.
    pub fn pattern_age_ms(&self) -> u64 {
        self.now_ms().saturating_sub(self.last_change_ms)
    }

    /// Arm the controller: seed every cell model and baseline from a fresh
    /// reading, clear the pattern and reset attempt bookkeeping.
    pub fn power_on(&mut self) -> Result<()> {
        for c in 0..self.cell_count {
            let v = self.read_mv(c)?;
            self.models[c].init(v);
            self.v_off[c] = v;
            self.v_on[c] = v;
        }
        self.powered = true;
        self.apply_pattern(0)?;
        self.von_captured = false;
        self.min_cell = 0;
        self.attempt_start_ms = 0;
        self.last_change_ms = 0;
        tracing::debug!(cells = self.cell_count, "balancer powered on");
        Ok(())
    }

    /// Disarm the controller. The all-off command is issued first, while the
    /// controller still counts as powered, so the gated switch writes happen.
    pub fn power_off(&mut self) -> Result<()> {
        self.apply_pattern(0)?;
        self.powered = false;
        tracing::debug!("balancer powered off");
        Ok(())
    }

    /// True iff every cell's voltage channel is reported settled.
    ///
    /// Switching perturbs the load and thus the readings; comparing unsettled
    /// values would cause false pattern oscillation.
    pub fn is_stable(&self) -> bool {
        (0..self.cell_count).all(|c| self.source.is_stable(c))
    }

    /// Estimate of `cell`'s no-load voltage (millivolts).
    ///
    /// Idle: the raw reading. Attempt active but on-load voltages not yet
    /// captured: the off-load baseline. Otherwise the live reading with the
    /// measured bleed-induced sag removed, so cells with different switch
    /// states compare fairly.
    pub fn presumed_voltage(&mut self, cell: usize) -> Result<i32> {
        if self.pattern == 0 {
            return self.read_mv(cell);
        }
        if !self.von_captured {
            return Ok(self.v_off[cell]);
        }
        let live = self.read_mv(cell)?;
        Ok(live + self.v_off[cell] - self.v_on[cell])
    }

    /// One iteration of the balancing loop; invoked once per control period
    /// by the outer scheduler. Bounded work, never blocks.
    pub fn tick(&mut self) -> Result<BalanceStatus> {
        if !self.powered {
            return Ok(BalanceStatus::Complete);
        }
        if !self.is_stable() {
            tracing::trace!("waiting for channels to settle");
            return Ok(BalanceStatus::Running);
        }
        if self.pattern == 0 {
            self.start_attempt()?;
        } else {
            self.try_save_on_voltage()?;
            let next = self.compute_pattern()?;
            let elapsed = self.balance_time_ms();
            if next != self.pattern || elapsed > self.cfg.max_balance_ms {
                tracing::debug!(
                    old = format_args!("{:#08b}", self.pattern),
                    new = format_args!("{next:#08b}"),
                    elapsed_ms = elapsed,
                    "attempt ended; pattern cleared"
                );
                self.apply_pattern(0)?;
            }
        }
        Ok(BalanceStatus::Running)
    }

    /// Feed every cell model a voltage/current observation (refits estimates).
    pub fn observe_cells(&mut self, i_ma: i32) -> Result<()> {
        for c in 0..self.cell_count {
            let v = self.read_mv(c)?;
            self.models[c].observe(v, i_ma);
        }
        Ok(())
    }

    /// Record a voltage/current sample on every cell model without refitting.
    pub fn store_samples(&mut self, i_ma: i32) -> Result<()> {
        for c in 0..self.cell_count {
            let v = self.read_mv(c)?;
            self.models[c].store_sample(v, i_ma);
        }
        Ok(())
    }

    /// Most restrictive charge current (milliamps) any cell's model predicts
    /// at `v_mv`; upper safety bound for the outer charge loop.
    pub fn min_safe_current(&self, v_mv: i32) -> i32 {
        let mut i = self.max_charge_ma;
        for c in 0..self.cell_count {
            i = i.min(self.models[c].predict_current(v_mv));
        }
        i
    }

    /// Least restrictive prediction (milliamps) at `v_mv`; lower bound for
    /// discharge-direction queries.
    pub fn max_safe_current(&self, v_mv: i32) -> i32 {
        let mut i = -self.max_charge_ma;
        for c in 0..self.cell_count {
            i = i.max(self.models[c].predict_current(v_mv));
        }
        i
    }

    /// True if any cell's raw or presumed voltage reaches `limit_mv`, so the
    /// outer loop can throttle immediately instead of waiting for a
    /// model-based prediction. No side effects on balancing state.
    pub fn would_exceed_max(&mut self, limit_mv: i32) -> Result<bool> {
        for c in 0..self.cell_count {
            if self.read_mv(c)? >= limit_mv {
                return Ok(true);
            }
            if self.presumed_voltage(c)? >= limit_mv {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True if any cell's raw or presumed voltage falls to `limit_mv` or below.
    pub fn would_exceed_min(&mut self, limit_mv: i32) -> Result<bool> {
        for c in 0..self.cell_count {
            if self.read_mv(c)? <= limit_mv {
                return Ok(true);
            }
            if self.presumed_voltage(c)? <= limit_mv {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Crude per-cell estimate from a pack total: `total / cell_count`,
    /// or 0 for the degenerate zero-cell configuration.
    pub fn average_per_cell(&self, total_mv: i32) -> i32 {
        if self.cell_count == 0 {
            return 0;
        }
        total_mv / self.cell_count as i32
    }

    /// Start a balancing attempt: pick the reference cell, take fresh
    /// baselines, and either short-circuit into power-off (already balanced)
    /// or apply the first pattern.
    fn start_attempt(&mut self) -> Result<()> {
        debug_assert!(
            self.pattern == 0 && self.powered,
            "attempt started while one is active or unpowered"
        );
        if self.cell_count == 0 {
            // Nothing to balance and no cell to read; end the session.
            tracing::info!("no cells configured; powering off");
            self.attempt_start_ms = self.now_ms();
            return self.power_off();
        }
        self.min_cell = self.min_cell_index()?;
        let vmin = self.read_mv(self.min_cell)?;

        let mut balanced = true;
        for c in 0..self.cell_count {
            let v = self.read_mv(c)?;
            self.v_off[c] = v;
            self.v_on[c] = v;
            if v - vmin > self.error_margin_mv {
                balanced = false;
            }
        }

        self.von_captured = false;
        self.attempt_start_ms = self.now_ms();
        if balanced {
            tracing::info!(
                vmin_mv = vmin,
                margin_mv = self.error_margin_mv,
                "pack balanced within tolerance; powering off"
            );
            self.power_off()?;
        } else {
            let pattern = self.compute_pattern()?;
            tracing::debug!(
                min_cell = self.min_cell,
                pattern = format_args!("{pattern:#08b}"),
                "balancing attempt started"
            );
            self.apply_pattern(pattern)?;
        }
        Ok(())
    }

    /// Derive the next switch pattern from presumed voltages with hysteresis:
    /// a cell that is ON stays ON while above the reference; a cell that is
    /// OFF turns ON only above the reference plus half the tolerance, so a
    /// cell hovering at the boundary does not chatter.
    fn compute_pattern(&mut self) -> Result<u8> {
        let vmin = self.presumed_voltage(self.min_cell)?;
        let mut next = 0u8;
        for c in 0..self.cell_count {
            let bit = 1u8 << c;
            let v = self.presumed_voltage(c)?;
            let threshold = if self.pattern & bit != 0 {
                vmin
            } else {
                vmin + self.half_margin_mv
            };
            if v > threshold {
                next |= bit;
            }
        }
        Ok(next)
    }

    /// Capture on-load voltages once per attempt; no-op after the first call.
    fn try_save_on_voltage(&mut self) -> Result<()> {
        if self.von_captured {
            return Ok(());
        }
        for c in 0..self.cell_count {
            self.v_on[c] = self.read_mv(c)?;
        }
        self.von_captured = true;
        tracing::trace!("on-load voltages captured");
        Ok(())
    }

    /// Record and apply a switch pattern. Invalidates measurement stability;
    /// the physical writes only happen while powered, so stray calls after
    /// power-off cannot re-enable a switch.
    fn apply_pattern(&mut self, mask: u8) -> Result<()> {
        self.pattern = mask;
        self.last_change_ms = self.now_ms();
        self.source.reset_stability();
        if self.powered {
            for c in 0..MAX_CELLS {
                let on = mask & (1u8 << c) != 0;
                self.switches
                    .set(c, on)
                    .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
                    .wrap_err("setting bleed switch")?;
            }
        }
        Ok(())
    }

    /// Index of the cell with the lowest raw voltage.
    fn min_cell_index(&mut self) -> Result<usize> {
        let mut idx = 0;
        let mut vmin = i32::MAX;
        for c in 0..self.cell_count {
            let v = self.read_mv(c)?;
            if v < vmin {
                vmin = v;
                idx = c;
            }
        }
        Ok(idx)
    }

    #[inline]
    fn read_mv(&mut self, cell: usize) -> Result<i32> {
        self.source
            .read(cell)
            .map_err(|e| eyre::Report::new(map_hw_error_dyn(&*e)))
            .wrap_err("reading cell voltage")
    }

    #[inline]
    fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }
}

// Map any error to a typed BalancerError, with special handling for hardware errors.
#[cfg(feature = "hardware-errors")]
fn map_hw_error_dyn(e: &(dyn std::error::Error + 'static)) -> BalancerError {
    use balancer_hardware::error::HwError;
    if let Some(hw) = e.downcast_ref::<HwError>() {
        return match hw {
            HwError::Timeout | HwError::NotReady => BalancerError::Timeout,
            other => BalancerError::HardwareFault(other.to_string()),
        };
    }
    map_hw_error_fallback(e)
}

#[cfg(not(feature = "hardware-errors"))]
fn map_hw_error_dyn(e: &(dyn std::error::Error + 'static)) -> BalancerError {
    map_hw_error_fallback(e)
}

fn map_hw_error_fallback(e: &(dyn std::error::Error + 'static)) -> BalancerError {
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        BalancerError::Timeout
    } else {
        BalancerError::Hardware(s)
    }
}

/// Public dynamic (boxed) balancer that preserves the builder API via composition.
pub struct Balancer {
    inner: BalancerCore<Box<dyn VoltageSource>, Box<dyn SwitchDriver>, Box<dyn CellModel>>,
}

impl core::fmt::Debug for Balancer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.inner, f)
    }
}

impl Balancer {
    /// Start building a Balancer.
    pub fn builder() -> BalancerBuilder<Missing, Missing, Missing> {
        BalancerBuilder::default()
    }

    pub fn cell_count(&self) -> usize {
        self.inner.cell_count()
    }
    pub fn pattern(&self) -> u8 {
        self.inner.pattern()
    }
    pub fn min_cell(&self) -> usize {
        self.inner.min_cell()
    }
    pub fn balance_cfg(&self) -> &BalanceCfg {
        self.inner.balance_cfg()
    }
    pub fn is_powered_on(&self) -> bool {
        self.inner.is_powered_on()
    }
    pub fn balance_time_ms(&self) -> u64 {
        self.inner.balance_time_ms()
    }
    pub fn pattern_age_ms(&self) -> u64 {
        self.inner.pattern_age_ms()
    }
    pub fn power_on(&mut self) -> Result<()> {
        self.inner.power_on()
    }
    pub fn power_off(&mut self) -> Result<()> {
        self.inner.power_off()
    }
    pub fn is_stable(&self) -> bool {
        self.inner.is_stable()
    }
    pub fn presumed_voltage(&mut self, cell: usize) -> Result<i32> {
        self.inner.presumed_voltage(cell)
    }
    pub fn tick(&mut self) -> Result<BalanceStatus> {
        self.inner.tick()
    }
    pub fn observe_cells(&mut self, i_ma: i32) -> Result<()> {
        self.inner.observe_cells(i_ma)
    }
    pub fn store_samples(&mut self, i_ma: i32) -> Result<()> {
        self.inner.store_samples(i_ma)
    }
    pub fn min_safe_current(&self, v_mv: i32) -> i32 {
        self.inner.min_safe_current(v_mv)
    }
    pub fn max_safe_current(&self, v_mv: i32) -> i32 {
        self.inner.max_safe_current(v_mv)
    }
    pub fn would_exceed_max(&mut self, limit_mv: i32) -> Result<bool> {
        self.inner.would_exceed_max(limit_mv)
    }
    pub fn would_exceed_min(&mut self, limit_mv: i32) -> Result<bool> {
        self.inner.would_exceed_min(limit_mv)
    }
    pub fn average_per_cell(&self, total_mv: i32) -> i32 {
        self.inner.average_per_cell(total_mv)
    }
}

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

use std::marker::PhantomData;

type ModelFactory = Box<dyn Fn() -> Box<dyn CellModel>>;

/// Builder for `Balancer`. All fields are validated on `build()`.
pub struct BalancerBuilder<V, W, C> {
    source: Option<Box<dyn VoltageSource>>,
    switches: Option<Box<dyn SwitchDriver>>,
    cell_count: Option<usize>,
    cfg: Option<BalanceCfg>,
    model_factory: Option<ModelFactory>,
    // Optional clock for tests (accept Box here)
    clock: Option<Box<dyn Clock + Send + Sync>>,
    // Type-state markers
    _v: PhantomData<V>,
    _w: PhantomData<W>,
    _c: PhantomData<C>,
}

impl Default for BalancerBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            source: None,
            switches: None,
            cell_count: None,
            cfg: None,
            model_factory: None,
            clock: None,
            _v: PhantomData,
            _w: PhantomData,
            _c: PhantomData,
        }
    }
}

impl<V, W, C> BalancerBuilder<V, W, C> {
    /// Fallible build available in any type-state; returns detailed BuildError for missing pieces.
    pub fn try_build(self) -> Result<Balancer> {
        let BalancerBuilder {
            source,
            switches,
            cell_count,
            cfg,
            model_factory,
            clock,
            _v: _,
            _w: _,
            _c: _,
        } = self;

        let source = source.ok_or_else(|| eyre::Report::new(BuildError::MissingVoltageSource))?;
        let switches = switches.ok_or_else(|| eyre::Report::new(BuildError::MissingSwitchDriver))?;
        let cell_count = cell_count.ok_or_else(|| eyre::Report::new(BuildError::MissingCellCount))?;
        let factory = model_factory.ok_or_else(|| eyre::Report::new(BuildError::MissingCellModel))?;

        let cfg = cfg.unwrap_or_default();
        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };

        validate_cfg(cell_count, &cfg)?;
        let models: [Box<dyn CellModel>; MAX_CELLS] = std::array::from_fn(|_| factory());

        Ok(Balancer {
            inner: assemble_core(source, switches, models, cfg, cell_count, clock),
        })
    }
}

/// Chainable setters that do not affect type-state
impl<V, W, C> BalancerBuilder<V, W, C> {
    pub fn with_config(mut self, cfg: BalanceCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }
    /// Factory invoked once per cell slot to create its Thevenin-style model.
    pub fn with_cell_model<F, M>(mut self, factory: F) -> Self
    where
        F: Fn() -> M + 'static,
        M: CellModel + 'static,
    {
        self.model_factory = Some(Box::new(move || Box::new(factory())));
        self
    }
    /// Provide a custom clock implementation; defaults to MonotonicClock when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state when providing mandatory components
impl<W, C> BalancerBuilder<Missing, W, C> {
    pub fn with_voltage_source(
        self,
        source: impl VoltageSource + 'static,
    ) -> BalancerBuilder<Set, W, C> {
        let BalancerBuilder {
            source: _,
            switches,
            cell_count,
            cfg,
            model_factory,
            clock,
            _v: _,
            _w: _,
            _c: _,
        } = self;
        BalancerBuilder {
            source: Some(Box::new(source)),
            switches,
            cell_count,
            cfg,
            model_factory,
            clock,
            _v: PhantomData,
            _w: PhantomData,
            _c: PhantomData,
        }
    }
}

impl<V, C> BalancerBuilder<V, Missing, C> {
    pub fn with_switch_driver(
        self,
        switches: impl SwitchDriver + 'static,
    ) -> BalancerBuilder<V, Set, C> {
        let BalancerBuilder {
            source,
            switches: _,
            cell_count,
            cfg,
            model_factory,
            clock,
            _v: _,
            _w: _,
            _c: _,
        } = self;
        BalancerBuilder {
            source,
            switches: Some(Box::new(switches)),
            cell_count,
            cfg,
            model_factory,
            clock,
            _v: PhantomData,
            _w: PhantomData,
            _c: PhantomData,
        }
    }
}

impl<V, W> BalancerBuilder<V, W, Missing> {
    pub fn with_cell_count(self, cells: usize) -> BalancerBuilder<V, W, Set> {
        let BalancerBuilder {
            source,
            switches,
            cell_count: _,
            cfg,
            model_factory,
            clock,
            _v: _,
            _w: _,
            _c: _,
        } = self;
        BalancerBuilder {
            source,
            switches,
            cell_count: Some(cells),
            cfg,
            model_factory,
            clock,
            _v: PhantomData,
            _w: PhantomData,
            _c: PhantomData,
        }
    }
}

impl BalancerBuilder<Set, Set, Set> {
    /// Validate and build the Balancer. Only available once the voltage
    /// source, switch driver and cell count are set.
    pub fn build(self) -> Result<Balancer> {
        self.try_build()
    }
}

fn validate_cfg(cell_count: usize, cfg: &BalanceCfg) -> Result<()> {
    if cell_count > MAX_CELLS {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "cell count exceeds switch hardware limit",
        )));
    }
    if !cfg.error_margin_v.is_finite() || cfg.error_margin_v.is_sign_negative() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "error_margin_v must be >= 0",
        )));
    }
    if cfg.max_balance_ms == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "max_balance_ms must be >= 1",
        )));
    }
    if !cfg.max_charge_a.is_finite() || cfg.max_charge_a <= 0.0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "max_charge_a must be > 0",
        )));
    }
    Ok(())
}

fn assemble_core<V, W, M>(
    source: V,
    switches: W,
    models: [M; MAX_CELLS],
    cfg: BalanceCfg,
    cell_count: usize,
    clock: Arc<dyn Clock + Send + Sync>,
) -> BalancerCore<V, W, M>
where
    V: VoltageSource,
    W: SwitchDriver,
    M: CellModel,
{
    let epoch = clock.now();
    let error_margin_mv = quantize_to_mv_i32(cfg.error_margin_v);
    let half_margin_mv = half_round_up(error_margin_mv);
    let max_charge_ma = quantize_to_ma_i32(cfg.max_charge_a);

    BalancerCore {
        source,
        switches,
        models,
        cfg,
        cell_count,
        clock,
        epoch,
        pattern: 0,
        powered: false,
        von_captured: false,
        min_cell: 0,
        v_off: [0; MAX_CELLS],
        v_on: [0; MAX_CELLS],
        attempt_start_ms: 0,
        last_change_ms: 0,
        error_margin_mv,
        half_margin_mv,
        max_charge_ma,
    }
}

/// Generic, statically-dispatched alias using the unified core.
pub type BalancerG<V, W, M> = BalancerCore<V, W, M>;

/// Build a generic, statically-dispatched BalancerG from concrete components.
pub fn build_balancer<V, W, M>(
    source: V,
    switches: W,
    models: [M; MAX_CELLS],
    cfg: BalanceCfg,
    cell_count: usize,
    clock: Option<Box<dyn Clock + Send + Sync>>,
) -> Result<BalancerG<V, W, M>>
where
    V: VoltageSource + 'static,
    W: SwitchDriver + 'static,
    M: CellModel + 'static,
{
    validate_cfg(cell_count, &cfg)?;
    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(b) => Arc::from(b),
        None => Arc::new(MonotonicClock::new()),
    };
    Ok(assemble_core(source, switches, models, cfg, cell_count, clock))
}
