//! Shared test fixtures: scripted hardware handles and a manual clock.
#![allow(dead_code)]

use balancer_traits::{Clock, SwitchDriver, VoltageSource};
use std::cell::RefCell;
use std::error::Error;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct SourceState {
    pub v_mv: Vec<i32>,
    pub stable: bool,
    pub stability_resets: u32,
}

/// Voltage source whose readings and stability flag the test mutates through
/// a shared handle while the balancer owns the other.
#[derive(Clone)]
pub struct SharedSource(pub Rc<RefCell<SourceState>>);

impl SharedSource {
    pub fn new(v_mv: &[i32]) -> Self {
        Self(Rc::new(RefCell::new(SourceState {
            v_mv: v_mv.to_vec(),
            stable: true,
            stability_resets: 0,
        })))
    }

    pub fn set_mv(&self, cell: usize, v_mv: i32) {
        self.0.borrow_mut().v_mv[cell] = v_mv;
    }

    pub fn settle(&self) {
        self.0.borrow_mut().stable = true;
    }

    pub fn resets(&self) -> u32 {
        self.0.borrow().stability_resets
    }
}

impl VoltageSource for SharedSource {
    fn read(&mut self, cell: usize) -> Result<i32, Box<dyn Error + Send + Sync>> {
        Ok(self.0.borrow().v_mv[cell])
    }
    fn is_stable(&self, _cell: usize) -> bool {
        self.0.borrow().stable
    }
    fn reset_stability(&mut self) {
        let mut s = self.0.borrow_mut();
        s.stable = false;
        s.stability_resets += 1;
    }
}

#[derive(Debug, Default)]
pub struct SwitchLog {
    pub states: [bool; 6],
    pub history: Vec<(usize, bool)>,
}

/// Switch driver spy recording every command.
#[derive(Clone, Default)]
pub struct SpySwitches(pub Rc<RefCell<SwitchLog>>);

impl SpySwitches {
    pub fn mask(&self) -> u8 {
        let log = self.0.borrow();
        log.states
            .iter()
            .enumerate()
            .fold(0u8, |m, (c, on)| if *on { m | (1 << c) } else { m })
    }

    pub fn ever_turned_on(&self) -> bool {
        self.0.borrow().history.iter().any(|(_, on)| *on)
    }
}

impl SwitchDriver for SpySwitches {
    fn set(&mut self, cell: usize, on: bool) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut log = self.0.borrow_mut();
        log.states[cell] = on;
        log.history.push((cell, on));
        Ok(())
    }
}

/// Deterministic clock advanced manually by the test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(Duration::from_millis(ms));
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let off = self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO);
        self.origin + off
    }
    fn sleep(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }
}
