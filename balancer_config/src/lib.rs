#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and validation for the cell-balancing system.
//!
//! `Config` and its sub-structs are deserialized from TOML and validated
//! against the hardware limits (at most six bleed channels).

use serde::Deserialize;
use thiserror::Error;

/// Hard limit on bleed channels; mirrors the switch hardware.
pub const MAX_CELLS: usize = 6;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Pins {
    /// GPIO pins driving the per-cell bleed switches, in cell order.
    pub bleed: Vec<u8>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Balance {
    /// Number of series cells being balanced.
    pub cell_count: usize,
    /// Cells within this of the lowest cell count as balanced (volts).
    pub error_margin_v: f32,
    /// Hard cap on a single balancing attempt (milliseconds).
    pub max_balance_ms: u64,
    /// Charger current capability used to seed safe-current queries (amps).
    pub max_charge_a: f32,
}

impl Default for Balance {
    fn default() -> Self {
        Self {
            cell_count: 3,
            error_margin_v: 0.010,
            max_balance_ms: 30_000,
            max_charge_a: 5.0,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// Ticks a channel needs after a switch change before it reads stable
    /// (simulated measurement subsystem).
    pub settle_ticks: u32,
    /// Control-loop tick period (milliseconds).
    pub tick_ms: u64,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            settle_ticks: 3,
            tick_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub balance: Balance,
    pub logging: Logging,
    pub hardware: Hardware,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cell_count must be <= {MAX_CELLS}, got {0}")]
    TooManyCells(usize),
    #[error("error_margin_v must be finite and >= 0")]
    InvalidErrorMargin,
    #[error("max_balance_ms must be >= 1")]
    InvalidBalanceTime,
    #[error("max_charge_a must be finite and > 0")]
    InvalidChargeCap,
    #[error("tick_ms must be >= 1")]
    InvalidTickPeriod,
    #[error("bleed pin list has {0} entries, limit is {MAX_CELLS}")]
    TooManyPins(usize),
    #[error("bleed pin list has fewer pins ({pins}) than cells ({cells})")]
    NotEnoughPins { pins: usize, cells: usize },
    #[error("duplicate bleed pin {0}")]
    DuplicatePin(u8),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.balance.cell_count > MAX_CELLS {
            return Err(ConfigError::TooManyCells(self.balance.cell_count));
        }
        if !self.balance.error_margin_v.is_finite() || self.balance.error_margin_v < 0.0 {
            return Err(ConfigError::InvalidErrorMargin);
        }
        if self.balance.max_balance_ms == 0 {
            return Err(ConfigError::InvalidBalanceTime);
        }
        if !self.balance.max_charge_a.is_finite() || self.balance.max_charge_a <= 0.0 {
            return Err(ConfigError::InvalidChargeCap);
        }
        if self.hardware.tick_ms == 0 {
            return Err(ConfigError::InvalidTickPeriod);
        }
        if self.pins.bleed.len() > MAX_CELLS {
            return Err(ConfigError::TooManyPins(self.pins.bleed.len()));
        }
        // An empty pin list is fine (simulation); a partial one is not.
        if !self.pins.bleed.is_empty() && self.pins.bleed.len() < self.balance.cell_count {
            return Err(ConfigError::NotEnoughPins {
                pins: self.pins.bleed.len(),
                cells: self.balance.cell_count,
            });
        }
        for (i, pin) in self.pins.bleed.iter().enumerate() {
            if self.pins.bleed[..i].contains(pin) {
                return Err(ConfigError::DuplicatePin(*pin));
            }
        }
        Ok(())
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}
