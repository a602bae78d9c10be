//! Integer helpers shared by calibration and control code.
//!
//! All conversions use truncating integer arithmetic so the forward and
//! inverse temperature mappings agree bit-for-bit with what is persisted.

/// Maximum temperature in internal units. No target may exceed it.
pub const INT_TEMP_MAX: u16 = 3700;

/// Ambient temperature (Celsius) assumed when no sensor reading is usable.
pub const DEFAULT_AMBIENT: i16 = 25;

/// Linear re-map of `x` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// Division truncates toward zero. Values outside the input range are
/// extrapolated, not clamped. A degenerate input range yields `out_min`.
#[inline]
pub fn map(x: i32, in_min: i32, in_max: i32, out_min: i32, out_max: i32) -> i32 {
    if in_max == in_min {
        return out_min;
    }
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Clamp `x` into `[lo, hi]`.
#[inline]
pub fn constrain(x: i32, lo: i32, hi: i32) -> i32 {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

#[inline]
pub fn celsius_to_fahrenheit(c: i32) -> i32 {
    (c * 9 + 32 * 5 + 2) / 5
}

#[inline]
pub fn fahrenheit_to_celsius(f: i32) -> i32 {
    ((f - 32) * 5 + 4) / 9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_interpolates_and_extrapolates() {
        assert_eq!(map(5, 0, 10, 0, 100), 50);
        assert_eq!(map(15, 0, 10, 0, 100), 150);
        assert_eq!(map(964, 964, 1290, 260, 330), 260);
        assert_eq!(map(7, 3, 3, 42, 99), 42);
    }

    #[test]
    fn test_constrain() {
        assert_eq!(constrain(-5, 0, 10), 0);
        assert_eq!(constrain(5, 0, 10), 5);
        assert_eq!(constrain(50, 0, 10), 10);
    }

    #[test]
    fn test_unit_conversion() {
        assert_eq!(celsius_to_fahrenheit(0), 32);
        assert_eq!(celsius_to_fahrenheit(100), 212);
        assert_eq!(celsius_to_fahrenheit(235), 455);
        assert_eq!(fahrenheit_to_celsius(212), 100);
        assert_eq!(fahrenheit_to_celsius(455), 235);
        assert_eq!(fahrenheit_to_celsius(32), 0);
    }
}
