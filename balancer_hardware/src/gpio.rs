//! GPIO bleed-switch driver for Linux boards (rppal).

use crate::error::HwError;
use balancer_traits::{MAX_CELLS, SwitchDriver};
use rppal::gpio::{Gpio, OutputPin};

/// Drives up to six bleed switches through GPIO output pins.
///
/// Channels beyond the populated pin list accept "off" commands as no-ops so
/// the controller can always command the full bank off; asking an
/// unpopulated channel to turn on is an error.
pub struct GpioSwitchDriver {
    pins: Vec<OutputPin>,
}

impl GpioSwitchDriver {
    pub fn new(bleed_pins: &[u8]) -> Result<Self, HwError> {
        if bleed_pins.len() > MAX_CELLS {
            return Err(HwError::ChannelOutOfRange(bleed_pins.len() - 1));
        }
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut pins = Vec::with_capacity(bleed_pins.len());
        for &pin in bleed_pins {
            let mut out = gpio
                .get(pin)
                .map_err(|e| HwError::Gpio(e.to_string()))?
                .into_output();
            out.set_low();
            pins.push(out);
        }
        Ok(Self { pins })
    }
}

impl SwitchDriver for GpioSwitchDriver {
    fn set(
        &mut self,
        cell: usize,
        on: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match self.pins.get_mut(cell) {
            Some(pin) => {
                if on {
                    pin.set_high();
                } else {
                    pin.set_low();
                }
                tracing::trace!(cell, on, "gpio bleed switch");
                Ok(())
            }
            None if !on && cell < MAX_CELLS => Ok(()),
            None => Err(Box::new(HwError::ChannelOutOfRange(cell))),
        }
    }
}
