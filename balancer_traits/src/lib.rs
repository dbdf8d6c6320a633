pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Hard limit on the number of series cells the switch hardware supports.
pub const MAX_CELLS: usize = 6;

/// Filtered per-cell voltage readings plus settling state.
///
/// The measurement subsystem owns noise filtering; `is_stable` reports whether
/// a channel's filtered value has stopped drifting since the last load change.
pub trait VoltageSource {
    /// Filtered voltage of `cell` in millivolts.
    fn read(&mut self, cell: usize) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;

    /// True once `cell`'s filtered reading has settled.
    fn is_stable(&self, cell: usize) -> bool;

    /// Discard settling state; called after any bleed-switch change because a
    /// load change invalidates prior "stable" readings.
    fn reset_stability(&mut self);
}

/// Driver for the per-cell bleed switches.
pub trait SwitchDriver {
    /// Command the bleed switch of `cell` on or off.
    fn set(&mut self, cell: usize, on: bool)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Per-cell Thevenin-style predictor.
///
/// The controller feeds it voltage/current samples; the outer charger queries
/// it through the controller for safe charge-current bounds. The fitting
/// algorithm behind `observe` is implementation-defined.
pub trait CellModel {
    /// Seed the model from a fresh no-load voltage (millivolts).
    fn init(&mut self, v_mv: i32);

    /// Update internal resistance/source estimates from a sample.
    fn observe(&mut self, v_mv: i32, i_ma: i32);

    /// Record a sample without refitting.
    fn store_sample(&mut self, v_mv: i32, i_ma: i32);

    /// Predicted current (milliamps) if the cell were held at `target_mv`.
    fn predict_current(&self, target_mv: i32) -> i32;
}

impl<T: VoltageSource + ?Sized> VoltageSource for Box<T> {
    fn read(&mut self, cell: usize) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(cell)
    }
    fn is_stable(&self, cell: usize) -> bool {
        (**self).is_stable(cell)
    }
    fn reset_stability(&mut self) {
        (**self).reset_stability();
    }
}

impl<T: SwitchDriver + ?Sized> SwitchDriver for Box<T> {
    fn set(
        &mut self,
        cell: usize,
        on: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).set(cell, on)
    }
}

impl<T: CellModel + ?Sized> CellModel for Box<T> {
    fn init(&mut self, v_mv: i32) {
        (**self).init(v_mv);
    }
    fn observe(&mut self, v_mv: i32, i_ma: i32) {
        (**self).observe(v_mv, i_ma);
    }
    fn store_sample(&mut self, v_mv: i32, i_ma: i32) {
        (**self).store_sample(v_mv, i_ma);
    }
    fn predict_current(&self, target_mv: i32) -> i32 {
        (**self).predict_current(target_mv)
    }
}
