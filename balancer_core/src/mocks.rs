//! Test and helper mocks for balancer_core

use balancer_traits::{CellModel, VoltageSource};

/// A voltage source that always errors on read; useful for wiring a balancer
/// whose measurement path is driven elsewhere.
pub struct NoopVoltageSource;

impl VoltageSource for NoopVoltageSource {
    fn read(&mut self, _cell: usize) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop voltage source")))
    }
    fn is_stable(&self, _cell: usize) -> bool {
        false
    }
    fn reset_stability(&mut self) {}
}

/// A cell model that predicts a fixed current regardless of target voltage.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatModel(pub i32);

impl CellModel for FlatModel {
    fn init(&mut self, _v_mv: i32) {}
    fn observe(&mut self, _v_mv: i32, _i_ma: i32) {}
    fn store_sample(&mut self, _v_mv: i32, _i_ma: i32) {}
    fn predict_current(&self, _target_mv: i32) -> i32 {
        self.0
    }
}
