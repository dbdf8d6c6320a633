//! Simulated pack hardware plus the optional GPIO bleed-switch driver.
//!
//! The simulation models just enough electrical behavior to exercise the
//! controller: bleeding a cell sags its reading immediately and discharges it
//! over time, and every switch change forces the measurement channels to
//! re-settle before they report stable again.

pub mod error;
#[cfg(feature = "hardware")]
pub mod gpio;

use balancer_traits::{CellModel, MAX_CELLS, SwitchDriver, VoltageSource};
use error::HwError;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug)]
struct PackState {
    v_mv: [i32; MAX_CELLS],
    bleeding: [bool; MAX_CELLS],
    // Ticks remaining until each channel reads stable again
    settle: [u32; MAX_CELLS],
    settle_ticks: u32,
    // Reading sag while a cell bleeds (millivolts)
    sag_mv: i32,
    // Discharge per simulation tick while bleeding (millivolts)
    bleed_mv_per_tick: i32,
}

/// Shared simulated battery pack backing a voltage source and switch driver.
///
/// Single-threaded by design, matching the control loop; both handles share
/// one `Rc<RefCell<...>>` state.
#[derive(Debug, Clone)]
pub struct SimulatedPack {
    state: Rc<RefCell<PackState>>,
}

impl SimulatedPack {
    pub fn new(cells_mv: &[i32], settle_ticks: u32) -> Self {
        let mut v_mv = [0i32; MAX_CELLS];
        for (slot, v) in v_mv.iter_mut().zip(cells_mv) {
            *slot = *v;
        }
        Self {
            state: Rc::new(RefCell::new(PackState {
                v_mv,
                bleeding: [false; MAX_CELLS],
                settle: [0; MAX_CELLS],
                settle_ticks,
                sag_mv: 15,
                bleed_mv_per_tick: 2,
            })),
        }
    }

    /// Override the bleed electrical parameters.
    pub fn set_discharge(&self, sag_mv: i32, bleed_mv_per_tick: i32) {
        let mut s = self.state.borrow_mut();
        s.sag_mv = sag_mv;
        s.bleed_mv_per_tick = bleed_mv_per_tick;
    }

    /// One tick of pack physics: bleeding cells lose charge, settling
    /// channels count down toward stable.
    pub fn advance(&self) {
        let mut s = self.state.borrow_mut();
        for c in 0..MAX_CELLS {
            if s.bleeding[c] {
                let next = (s.v_mv[c] - s.bleed_mv_per_tick).max(0);
                s.v_mv[c] = next;
            }
            s.settle[c] = s.settle[c].saturating_sub(1);
        }
    }

    /// Open-circuit voltage of `cell` (no sag applied).
    pub fn cell_mv(&self, cell: usize) -> i32 {
        self.state.borrow().v_mv[cell]
    }

    pub fn is_bleeding(&self, cell: usize) -> bool {
        self.state.borrow().bleeding[cell]
    }

    pub fn voltage_source(&self) -> SimulatedVoltageSource {
        SimulatedVoltageSource {
            state: Rc::clone(&self.state),
        }
    }

    pub fn switch_driver(&self) -> SimulatedSwitchDriver {
        SimulatedSwitchDriver {
            state: Rc::clone(&self.state),
        }
    }
}

/// Voltage source handle onto a [`SimulatedPack`].
pub struct SimulatedVoltageSource {
    state: Rc<RefCell<PackState>>,
}

impl VoltageSource for SimulatedVoltageSource {
    fn read(&mut self, cell: usize) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let s = self.state.borrow();
        if cell >= MAX_CELLS {
            return Err(Box::new(HwError::ChannelOutOfRange(cell)));
        }
        let sag = if s.bleeding[cell] { s.sag_mv } else { 0 };
        Ok(s.v_mv[cell] - sag)
    }

    fn is_stable(&self, cell: usize) -> bool {
        let s = self.state.borrow();
        cell < MAX_CELLS && s.settle[cell] == 0
    }

    fn reset_stability(&mut self) {
        let mut s = self.state.borrow_mut();
        let ticks = s.settle_ticks;
        s.settle = [ticks; MAX_CELLS];
    }
}

/// Switch driver handle onto a [`SimulatedPack`].
pub struct SimulatedSwitchDriver {
    state: Rc<RefCell<PackState>>,
}

impl SwitchDriver for SimulatedSwitchDriver {
    fn set(
        &mut self,
        cell: usize,
        on: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if cell >= MAX_CELLS {
            return Err(Box::new(HwError::ChannelOutOfRange(cell)));
        }
        let mut s = self.state.borrow_mut();
        if s.bleeding[cell] != on {
            tracing::trace!(cell, on, "bleed switch");
        }
        s.bleeding[cell] = on;
        Ok(())
    }
}

/// Query-side Thevenin cell model with a fixed internal resistance.
///
/// `observe` re-derives the source voltage from the latest sample; it does
/// not fit the resistance, which is supplied at construction.
#[derive(Debug, Clone)]
pub struct SimpleCellModel {
    vth_mv: i32,
    rth_mohm: i32,
    last_v_mv: i32,
    last_i_ma: i32,
}

impl SimpleCellModel {
    pub fn new(rth_mohm: i32) -> Self {
        Self {
            vth_mv: 0,
            rth_mohm: rth_mohm.max(1),
            last_v_mv: 0,
            last_i_ma: 0,
        }
    }

    pub fn vth_mv(&self) -> i32 {
        self.vth_mv
    }

    pub fn last_sample(&self) -> (i32, i32) {
        (self.last_v_mv, self.last_i_ma)
    }
}

impl CellModel for SimpleCellModel {
    fn init(&mut self, v_mv: i32) {
        self.vth_mv = v_mv;
        self.last_v_mv = v_mv;
        self.last_i_ma = 0;
    }

    fn observe(&mut self, v_mv: i32, i_ma: i32) {
        // v = vth + i * rth  =>  vth = v - i * rth
        // mA * mOhm / 1000 = mV
        let drop_mv = (i64::from(i_ma) * i64::from(self.rth_mohm)) / 1_000;
        self.vth_mv = v_mv - drop_mv as i32;
        self.store_sample(v_mv, i_ma);
    }

    fn store_sample(&mut self, v_mv: i32, i_ma: i32) {
        self.last_v_mv = v_mv;
        self.last_i_ma = i_ma;
    }

    fn predict_current(&self, target_mv: i32) -> i32 {
        // mV * 1000 / mOhm = mA
        let i = i64::from(target_mv - self.vth_mv) * 1_000 / i64::from(self.rth_mohm);
        i.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }
}
