//! Calibration curves in use and the internal-unit to Celsius mapping.
//!
//! One context serves both heaters. It holds an independent curve slot for
//! the iron and for the hot air gun; `gun_active` picks the slot and the
//! valid Celsius range used by default.

use super::{is_valid_tip_config, TipMask, TipRecord};
use crate::units::{constrain, map, DEFAULT_AMBIENT, INT_TEMP_MAX};

/// Which heater a conversion refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Iron,
    Gun,
}

impl Device {
    #[inline]
    fn slot(self) -> usize {
        match self {
            Device::Iron => 0,
            Device::Gun => 1,
        }
    }

    /// Reference temperatures (Celsius) of the four calibration points.
    #[inline]
    pub fn reference_temps(self) -> [u16; 4] {
        match self {
            Device::Iron => [200, 260, 330, 400],
            Device::Gun => [200, 300, 400, 500],
        }
    }

    /// Lowest preset temperature in Celsius.
    #[inline]
    pub fn min_c(self) -> u16 {
        match self {
            Device::Iron => 180,
            Device::Gun => 40,
        }
    }

    /// Highest preset temperature in Celsius.
    #[inline]
    pub fn max_c(self) -> u16 {
        match self {
            Device::Iron => 450,
            Device::Gun => 500,
        }
    }
}

/// Internal readings at the four reference temperatures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalibrationCurve {
    pub points: [u16; 4],
    /// Ambient temperature (Celsius) at calibration time.
    pub ambient: i8,
    pub mask: TipMask,
}

impl CalibrationCurve {
    /// Fallback for uncalibrated tips. Deliberately low so an unknown tip
    /// cannot be overheated.
    pub const DEFAULT: CalibrationCurve = CalibrationCurve {
        points: [680, 964, 1290, 1600],
        ambient: DEFAULT_AMBIENT as i8,
        mask: TipMask::ACTIVE,
    };

    #[inline]
    pub fn is_valid(&self) -> bool {
        is_valid_tip_config(&self.points)
    }
}

impl From<&TipRecord> for CalibrationCurve {
    fn from(tip: &TipRecord) -> Self {
        Self {
            points: tip.points,
            ambient: tip.ambient,
            mask: tip.mask,
        }
    }
}

/// Curves of the iron and the gun plus the active device selector.
pub struct TipCalibrationContext {
    curves: [CalibrationCurve; 2],
    gun_active: bool,
}

impl TipCalibrationContext {
    pub const fn new() -> Self {
        Self {
            curves: [CalibrationCurve::DEFAULT; 2],
            gun_active: false,
        }
    }

    /// Select the device used when no device is forced.
    #[inline]
    pub fn activate_gun(&mut self, gun: bool) {
        self.gun_active = gun;
    }

    #[inline]
    pub fn gun_active(&self) -> bool {
        self.gun_active
    }

    #[inline]
    pub fn active_device(&self) -> Device {
        if self.gun_active {
            Device::Gun
        } else {
            Device::Iron
        }
    }

    #[inline]
    fn device(&self, force: Option<Device>) -> Device {
        force.unwrap_or_else(|| self.active_device())
    }

    #[inline]
    pub fn temp_min_c(&self) -> u16 {
        self.active_device().min_c()
    }

    #[inline]
    pub fn temp_max_c(&self) -> u16 {
        self.active_device().max_c()
    }

    /// Reference temperature `index` (0..4) of the active or forced device.
    #[inline]
    pub fn reference_temp(&self, index: usize, force: Option<Device>) -> u16 {
        self.device(force).reference_temps().get(index).copied().unwrap_or(0)
    }

    /// Curve of `device`.
    #[inline]
    pub fn curve(&self, device: Device) -> &CalibrationCurve {
        &self.curves[device.slot()]
    }

    /// Curve of the active device.
    #[inline]
    pub fn active_curve(&self) -> &CalibrationCurve {
        self.curve(self.active_device())
    }

    /// Calibration point `index` of the active device, 0 when out of range.
    #[inline]
    pub fn calibration(&self, index: usize) -> u16 {
        self.active_curve().points.get(index).copied().unwrap_or(0)
    }

    /// Ambient temperature recorded with the active curve.
    #[inline]
    pub fn ambient_temp(&self) -> i8 {
        self.active_curve().ambient
    }

    #[inline]
    pub fn is_calibrated(&self) -> bool {
        self.active_curve().mask.is_calibrated()
    }

    /// Install a stored record as the curve of `device`.
    #[inline]
    pub fn load(&mut self, tip: &TipRecord, device: Device) {
        self.curves[device.slot()] = CalibrationCurve::from(tip);
    }

    /// Install the fallback curve for `device`.
    #[inline]
    pub fn default_calibration(&mut self, device: Device) {
        self.curves[device.slot()] = CalibrationCurve::DEFAULT;
    }

    /// Fall back to the default curve for the active device.
    #[inline]
    pub fn reset_tip_calibration(&mut self) {
        self.default_calibration(self.active_device());
    }

    /// Replace the active curve with freshly measured points.
    ///
    /// The curve is marked active and calibrated; the top point is capped at
    /// the internal ceiling.
    pub fn apply_tip_calibration(&mut self, points: [u16; 4], ambient: i8) {
        let curve = &mut self.curves[self.active_device().slot()];
        curve.points = points;
        curve.ambient = ambient;
        curve.mask = TipMask::ACTIVE_CALIBRATED;
        if curve.points[3] > INT_TEMP_MAX {
            curve.points[3] = INT_TEMP_MAX;
        }
    }

    /// Convert internal units to Celsius.
    ///
    /// Piecewise linear over the four calibration points, each reference
    /// shifted by the ambient drift since calibration. Below the first point
    /// the line runs from `(0, ambient)`; above the last point it extends the
    /// line through points 1 and 3. The result is clamped to
    /// `[ambient, 999]`.
    pub fn temp_celsius(&self, temp: u16, ambient: i16, force: Option<Device>) -> u16 {
        let device = self.device(force);
        let curve = self.curve(device);
        let refs = device.reference_temps();
        let cal = curve.points.map(i32::from);
        let amb = i32::from(ambient);
        let d = amb - i32::from(curve.ambient);
        let r = |i: usize| i32::from(refs[i]) + d;
        let t = i32::from(temp);

        let temp_h = if t < cal[0] {
            map(t, 0, cal[0], amb, r(0))
        } else if t <= cal[3] {
            // t == cal[3] lands on the last segment's right end
            let j = (1..4).find(|&j| t < cal[j]).unwrap_or(3);
            map(t, cal[j - 1], cal[j], r(j - 1), r(j))
        } else {
            map(t, cal[1], cal[3], r(1), r(3))
        };
        constrain(temp_h, amb, 999) as u16
    }
}

impl Default for TipCalibrationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_point_hits_reference_temp() {
        let ctx = TipCalibrationContext::new();
        assert_eq!(ctx.temp_celsius(964, 25, None), 260);
        assert_eq!(ctx.temp_celsius(680, 25, None), 200);
        assert_eq!(ctx.temp_celsius(1290, 25, None), 330);
        assert_eq!(ctx.temp_celsius(1600, 25, None), 400);
    }

    #[test]
    fn test_ambient_drift_shifts_curve() {
        let ctx = TipCalibrationContext::new();
        assert_eq!(ctx.temp_celsius(964, 30, None), 265);
    }

    #[test]
    fn test_below_first_point_starts_at_ambient() {
        let ctx = TipCalibrationContext::new();
        assert_eq!(ctx.temp_celsius(0, 25, None), 25);
        assert_eq!(ctx.temp_celsius(340, 25, None), 112);
    }

    #[test]
    fn test_extrapolation_uses_points_one_and_three() {
        let ctx = TipCalibrationContext::new();
        // (2000 - 964) * 140 / 636 + 260
        assert_eq!(ctx.temp_celsius(2000, 25, None), 488);
    }

    #[test]
    fn test_result_clamped() {
        let ctx = TipCalibrationContext::new();
        assert_eq!(ctx.temp_celsius(u16::MAX, 25, None), 999);
    }

    #[test]
    fn test_forced_device() {
        let ctx = TipCalibrationContext::new();
        assert_eq!(ctx.temp_celsius(964, 25, Some(Device::Gun)), 300);
        assert_eq!(ctx.reference_temp(3, Some(Device::Gun)), 500);
        assert_eq!(ctx.reference_temp(4, None), 0);
    }

    #[test]
    fn test_apply_calibration_caps_top_point() {
        let mut ctx = TipCalibrationContext::new();
        ctx.apply_tip_calibration([700, 1200, 2500, 4000], 22);
        assert_eq!(ctx.calibration(3), INT_TEMP_MAX);
        assert!(ctx.is_calibrated());
        assert_eq!(ctx.ambient_temp(), 22);
        ctx.reset_tip_calibration();
        assert_eq!(*ctx.active_curve(), CalibrationCurve::DEFAULT);
    }

    #[test]
    fn test_gun_range() {
        let mut ctx = TipCalibrationContext::new();
        assert_eq!((ctx.temp_min_c(), ctx.temp_max_c()), (180, 450));
        ctx.activate_gun(true);
        assert_eq!((ctx.temp_min_c(), ctx.temp_max_c()), (40, 500));
    }
}
