//! Module: calibration
//!
//! Purpose: Build a tip calibration curve from measured temperatures.
//!
//! Architecture:
//! - `AutoCalibration` walks the heater through an 8-point schedule of
//!   internal targets. At each point the operator enters the real
//!   temperature read from an external thermometer.
//! - The schedule adapts: when the tip runs hotter or colder than expected,
//!   the remaining targets are spread over a smaller or larger range.
//! - `calibration_ols` fits `internal = a * real + b` through the samples and
//!   projects the four reference temperatures through the line.
//! - `build_calibration` repairs a manually entered curve so that the points
//!   stay increasing and well separated.

use crate::heater::HeaterState;
use crate::log_globals::MAIN_LOG;
use crate::rt_info;
use crate::timing::Deadline;
use crate::tips::Device;
use crate::units::{map, INT_TEMP_MAX};

/// Number of measured points in an automatic calibration.
pub const CALIBRATION_POINTS: usize = 8;

/// Internal target of the first schedule point.
pub const START_INT_TEMP: u16 = 600;

/// Time the heater must hold a new target before a reading is accepted.
pub const SETTLE_DELAY_MS: u32 = 5_000;

/// Minimum distance between neighbouring manual calibration points.
pub const MIN_POINT_GAP: u16 = 200;

/// Samples used by the fit must lie in `[FIT_MIN_C, ..]` Celsius.
pub const FIT_MIN_C: u16 = 150;

/// Fit range used for live curve updates while calibrating.
pub const LIVE_FIT_MAX_C: u16 = 600;

/// A real reading within this distance of the device maximum ends the run.
const FINISH_MARGIN_C: u16 = 20;

const READY_TEMP_WINDOW: i32 = 16;
const READY_MAX_PWR_DISPERSION: u32 = 200;
const READY_MIN_POWER_PCNT: u8 = 1;

/// One measured point: the real temperature and the internal reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CalibrationSample {
    /// Celsius, 0 if the point was not measured yet.
    pub real_c: u16,
    pub internal: u16,
}

/// Least-squares line `internal = a * real + b` through the samples whose
/// real temperature lies in `[min_c, max_c]`.
///
/// `None` with fewer than three usable samples or when all of them share
/// one real temperature.
pub fn ols_fit(samples: &[CalibrationSample], min_c: u16, max_c: u16) -> Option<(f64, f64)> {
    let mut n = 0f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0f64, 0f64, 0f64, 0f64);
    for s in samples.iter().filter(|s| s.real_c >= min_c && s.real_c <= max_c) {
        let x = f64::from(s.real_c);
        let y = f64::from(s.internal);
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
        n += 1.0;
    }
    if n < 3.0 {
        return None;
    }
    let denom = n * sum_x2 - sum_x * sum_x;
    if denom == 0.0 {
        return None;
    }
    let a = (n * sum_xy - sum_x * sum_y) / denom;
    let b = (sum_y - a * sum_x) / n;
    Some((a, b))
}

/// Project the reference temperatures of `device` through the fitted line.
///
/// The top point is capped at [`INT_TEMP_MAX`].
pub fn calibration_ols(samples: &[CalibrationSample], min_c: u16, max_c: u16, device: Device) -> Option<[u16; 4]> {
    let (a, b) = ols_fit(samples, min_c, max_c)?;
    let refs = device.reference_temps();
    let mut points = [0u16; 4];
    for (p, r) in points.iter_mut().zip(refs) {
        *p = to_internal(a * f64::from(r) + b);
    }
    points[3] = points[3].min(INT_TEMP_MAX);
    Some(points)
}

fn to_internal(value: f64) -> u16 {
    libm::round(value).clamp(0.0, f64::from(u16::MAX)) as u16
}

/// Make a manually edited curve strictly increasing with at least
/// [`MIN_POINT_GAP`] between neighbours.
///
/// `ref_point` is the point the operator just set. Points to its right are
/// pushed up, the top point is capped at [`INT_TEMP_MAX`], then points are
/// pushed down from the top. If that runs into zero the curve is pushed up
/// once more from the bottom. A `ref_point` above 3 only applies the cap.
pub fn build_calibration(points: &mut [u16; 4], ref_point: usize) {
    points[3] = points[3].min(INT_TEMP_MAX);
    if ref_point > 3 {
        return;
    }
    push_up(points, ref_point);
    points[3] = points[3].min(INT_TEMP_MAX);
    for i in (1..4).rev() {
        if i32::from(points[i]) - i32::from(points[i - 1]) < i32::from(MIN_POINT_GAP) {
            points[i - 1] = points[i].saturating_sub(MIN_POINT_GAP);
        }
    }
    // Three gaps always fit below INT_TEMP_MAX
    push_up(points, 0);
}

fn push_up(points: &mut [u16; 4], from: usize) {
    for i in from..3 {
        if i32::from(points[i + 1]) - i32::from(points[i]) < i32::from(MIN_POINT_GAP) {
            points[i + 1] = points[i].saturating_add(MIN_POINT_GAP);
        }
    }
}

/// What happened after a reading was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Heat to the next schedule point.
    NextPoint,
    /// The schedule is complete or the tip reached the device maximum.
    Complete,
}

/// Automatic multi-point calibration of one tip.
///
/// ```ignore
/// let mut cal = AutoCalibration::new(Device::Iron);
/// while let Some(target) = cal.start_point(now_ms()) {
///     HEATER.set_temp(target);
///     HEATER.switch_power(true);
///     while !cal.check_ready(now_ms(), &HEATER) { /* wait */ }
///     HEATER.switch_power(false);
///     if cal.record(operator_reading(), HEATER.average_temp()) == RecordOutcome::Complete {
///         break;
///     }
/// }
/// if let Some(points) = cal.finish() { /* apply and save */ }
/// ```
pub struct AutoCalibration {
    device: Device,
    samples: [CalibrationSample; CALIBRATION_POINTS],
    index: usize,
    tip_temp_max: u16,
    settle: Option<Deadline>,
}

impl AutoCalibration {
    pub fn new(device: Device) -> Self {
        let tip_temp_max = INT_TEMP_MAX / 2;
        let mut cal = Self {
            device,
            samples: [CalibrationSample::default(); CALIBRATION_POINTS],
            index: 0,
            tip_temp_max,
            settle: None,
        };
        cal.reschedule(0);
        cal
    }

    #[inline]
    pub fn device(&self) -> Device {
        self.device
    }

    /// Index of the point being measured; [`CALIBRATION_POINTS`] when done.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn samples(&self) -> &[CalibrationSample; CALIBRATION_POINTS] {
        &self.samples
    }

    /// Current upper end of the internal schedule.
    #[inline]
    pub fn tip_temp_max(&self) -> u16 {
        self.tip_temp_max
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.index >= CALIBRATION_POINTS
    }

    /// Internal target of the current point, `None` when the schedule is
    /// complete.
    #[inline]
    pub fn target(&self) -> Option<u16> {
        self.samples.get(self.index).map(|s| s.internal)
    }

    /// Begin heating toward the current point and arm the settle delay.
    pub fn start_point(&mut self, now_ms: u32) -> Option<u16> {
        let target = self.target()?;
        self.settle = Some(Deadline::after(now_ms, SETTLE_DELAY_MS));
        Some(target)
    }

    /// Heater holds `target` steadily enough for a reading.
    pub fn is_stable(target: u16, avg_temp: u16, pwr_dispersion: u32, power_pcnt: u8) -> bool {
        (i32::from(target) - i32::from(avg_temp)).abs() <= READY_TEMP_WINDOW
            && pwr_dispersion <= READY_MAX_PWR_DISPERSION
            && power_pcnt > READY_MIN_POWER_PCNT
    }

    /// Settle delay elapsed and the heater is stable at its target.
    pub fn check_ready(&self, now_ms: u32, heater: &HeaterState) -> bool {
        let settled = self.settle.is_some_and(|d| d.expired(now_ms));
        settled
            && Self::is_stable(
                heater.preset_temp(),
                heater.average_temp(),
                heater.pwr_dispersion(),
                heater.avg_power_pcnt(),
            )
    }

    /// Store the operator's reading `real_c` for the internal value
    /// `internal` measured at the current point.
    pub fn record(&mut self, real_c: u16, internal: u16) -> RecordOutcome {
        let Some(sample) = self.samples.get_mut(self.index) else {
            return RecordOutcome::Complete;
        };
        *sample = CalibrationSample { real_c, internal };
        self.settle = None;

        if real_c >= self.device.max_c().saturating_sub(FINISH_MARGIN_C) {
            rt_info!(MAIN_LOG, "calibration: device maximum reached at point {}", self.index);
            self.index = CALIBRATION_POINTS;
            return RecordOutcome::Complete;
        }
        self.update_reference(self.index);
        self.index += 1;
        if self.is_complete() {
            RecordOutcome::Complete
        } else {
            RecordOutcome::NextPoint
        }
    }

    /// Curve fitted through the samples so far, for live preview.
    pub fn interim_curve(&self) -> Option<[u16; 4]> {
        calibration_ols(&self.samples, FIT_MIN_C, LIVE_FIT_MAX_C, self.device)
    }

    /// Index of the measured sample whose real temperature is closest to
    /// `temp_c`.
    pub fn closest_index(&self, temp_c: u16) -> Option<usize> {
        self.samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.real_c > 0)
            .map(|(i, s)| (i, s.real_c.abs_diff(temp_c)))
            .filter(|&(_, diff)| diff < 1000)
            .min_by_key(|&(i, diff)| (diff, i))
            .map(|(i, _)| i)
    }

    /// Final curve.
    ///
    /// Points 0..2 come from the fit over `[FIT_MIN_C, ref2]`. Point 3 is
    /// extrapolated from point 2 toward the sample measured closest to the
    /// top reference temperature.
    pub fn finish(&self) -> Option<[u16; 4]> {
        let refs = self.device.reference_temps();
        let mut points = calibration_ols(&self.samples, FIT_MIN_C, refs[2], self.device)?;
        if let Some(near) = self.closest_index(refs[3]).map(|i| self.samples[i]) {
            let top = map(
                i32::from(refs[3]),
                i32::from(refs[2]),
                i32::from(near.real_c),
                i32::from(points[2]),
                i32::from(near.internal),
            );
            points[3] = top.clamp(0, i32::from(INT_TEMP_MAX)) as u16;
        }
        points[3] = points[3].min(INT_TEMP_MAX);
        Some(points)
    }

    fn update_reference(&mut self, index: usize) {
        let expected = map(
            index as i32,
            0,
            CALIBRATION_POINTS as i32,
            i32::from(self.device.min_c()),
            i32::from(self.device.max_c()),
        );
        let real = i32::from(self.samples[index].real_c);
        let early = index < 5;
        let max = self.tip_temp_max;

        // Early points tolerate a wider band before the schedule moves.
        let scaled = if early && real > expected + expected / 4 {
            max - (max >> 2)
        } else if real > expected + expected / 8 {
            max + (max >> 3)
        } else if early && real < expected - expected / 4 {
            max + (max >> 2)
        } else if real < expected - expected / 8 {
            max + (max >> 3)
        } else {
            return;
        };
        self.tip_temp_max = scaled.clamp(INT_TEMP_MAX / 4, INT_TEMP_MAX);
        self.reschedule(index + 1);
    }

    fn reschedule(&mut self, from: usize) {
        let last = CALIBRATION_POINTS as i32 - 1;
        for i in from..CALIBRATION_POINTS {
            let t = map(i as i32, 0, last, i32::from(START_INT_TEMP), i32::from(self.tip_temp_max));
            self.samples[i].internal = t.clamp(0, i32::from(INT_TEMP_MAX)) as u16;
        }
    }
}
