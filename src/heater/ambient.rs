//! Ambient temperature from the handle thermistor.
//!
//! NTC on the high side of a 10 kΩ divider read by a 12-bit ADC.
//! Steinhart-Hart in its β form:
//! `1/T = 1/T0 + ln(R/R0) / β`.

use crate::units::DEFAULT_AMBIENT;

const ADC_FULL_SCALE: f32 = 4095.0;
const DIVIDER_OHM: f32 = 10_000.0;
const NOMINAL_OHM: f32 = 10_000.0;
const NOMINAL_C: f32 = 25.0;
const BETA: f32 = 3950.0;
const KELVIN: f32 = 273.15;

/// Raw readings at or above this mean the handle is unplugged (about -30 C).
pub const MAX_AMBIENT_RAW: u16 = 3900;

/// Raw movement below which the cached temperature is reused.
const RECALC_THRESHOLD: u16 = 20;

/// Cached thermistor conversion, owned by the heater controller.
#[derive(Clone, Copy, Debug)]
pub struct AmbientSensor {
    last_raw: u16,
    cached: i16,
}

impl AmbientSensor {
    pub const fn new() -> Self {
        Self {
            last_raw: 0,
            cached: DEFAULT_AMBIENT,
        }
    }

    /// True if `raw` cannot come from a connected thermistor.
    #[inline]
    pub fn is_disconnected(raw: u16) -> bool {
        raw == 0 || raw >= MAX_AMBIENT_RAW
    }

    /// Ambient temperature in Celsius for the filtered reading `raw`.
    ///
    /// Recomputed only when `raw` moved by more than a few counts since the
    /// last conversion.
    pub fn temperature(&mut self, raw: u16) -> i16 {
        if raw.abs_diff(self.last_raw) < RECALC_THRESHOLD {
            return self.cached;
        }
        self.last_raw = raw;
        self.cached = if Self::is_disconnected(raw) {
            DEFAULT_AMBIENT
        } else {
            steinhart_celsius(raw)
        };
        self.cached
    }
}

impl Default for AmbientSensor {
    fn default() -> Self {
        Self::new()
    }
}

fn steinhart_celsius(raw: u16) -> i16 {
    let ratio = ADC_FULL_SCALE / f32::from(raw) - 1.0;
    let resistance = DIVIDER_OHM / ratio;
    let mut inv_t = libm::logf(resistance / NOMINAL_OHM) / BETA;
    inv_t += 1.0 / (NOMINAL_C + KELVIN);
    libm::roundf(1.0 / inv_t - KELVIN) as i16
}
