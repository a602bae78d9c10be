//! Integration tests for tip calibration
//!
//! Tests the calibration workflow end to end:
//! - Automatic 8-point run against a simulated tip
//! - Readiness gating on the live heater state
//! - Least-squares fit and manual curve repair
//! - Unit mapping properties of the resulting curve

mod common;

use common::{store_with, MemStorage, Proportional};
use solder_station::calibration::{
    build_calibration, calibration_ols, AutoCalibration, CalibrationSample, RecordOutcome, CALIBRATION_POINTS,
    MIN_POINT_GAP, SETTLE_DELAY_MS, START_INT_TEMP,
};
use solder_station::heater::NoTuning;
use solder_station::tips::{Device, TipCalibrationContext, TipMask};
use solder_station::units::INT_TEMP_MAX;
use solder_station::{FaultState, HeaterController, HeaterState};

/// Simulated tip: the sensor reads four internal units per degree.
fn real_temp(internal: u16) -> u16 {
    internal / 4
}

fn run_auto_calibration(device: Device) -> (AutoCalibration, usize) {
    let mut cal = AutoCalibration::new(device);
    let mut readings = 0;
    let mut now = 0u32;
    while let Some(target) = cal.start_point(now) {
        now += SETTLE_DELAY_MS;
        let real = real_temp(target);
        readings += 1;
        if cal.record(real, real * 4) == RecordOutcome::Complete {
            break;
        }
    }
    (cal, readings)
}

#[test]
fn test_auto_calibration_recovers_linear_tip() {
    let (cal, readings) = run_auto_calibration(Device::Iron);

    // The sixth reading reaches the iron maximum
    assert_eq!(readings, 6);
    assert!(cal.is_complete());
    assert_eq!(cal.index(), CALIBRATION_POINTS);
    assert_eq!(cal.samples()[0].internal, START_INT_TEMP);
    assert_eq!(cal.finish(), Some([800, 1040, 1320, 1600]));
}

#[test]
fn test_calibrated_curve_maps_references_exactly() {
    let (cal, _) = run_auto_calibration(Device::Iron);
    let points = cal.finish().unwrap();
    let mut store = store_with(MemStorage::new(4));

    assert!(store.save_tip_calibration(3, points, TipMask::ACTIVE_CALIBRATED, 25));
    assert!(store.change_tip(3));

    for (i, &point) in points.iter().enumerate() {
        assert_eq!(store.temp_to_human(point, 25, None), store.reference_temp(i, None));
    }
    // Four internal units per degree: 300 C is any of 1200..=1203
    let internal = store.human_to_temp(300, 25);
    assert!((1200..=1203).contains(&internal), "internal={}", internal);
    assert_eq!(store.temp_to_human(internal, 25, None), 300);
}

#[test]
fn test_interim_curve_needs_three_readings() {
    let mut cal = AutoCalibration::new(Device::Iron);
    assert!(cal.interim_curve().is_none());

    for real in [160u16, 200, 240] {
        cal.record(real, real * 4);
    }

    assert_eq!(cal.interim_curve(), Some([800, 1040, 1320, 1600]));
}

#[test]
fn test_closest_index_ignores_unmeasured_points() {
    let mut cal = AutoCalibration::new(Device::Iron);
    assert!(cal.closest_index(400).is_none());

    cal.record(180, 720);
    cal.record(220, 880);

    assert_eq!(cal.closest_index(400), Some(1));
    assert_eq!(cal.closest_index(100), Some(0));
}

#[test]
fn test_ready_after_settle_delay_on_stable_heater() {
    let state = HeaterState::new();
    let fault = FaultState::new();
    let mut ctrl = HeaterController::new(&state, &fault, Proportional::default(), NoTuning);
    let mut cal = AutoCalibration::new(Device::Iron);

    assert!(!cal.check_ready(100_000, &state));

    let target = cal.start_point(1_000).unwrap();
    state.set_temp(target);
    state.fix_power(300);
    for _ in 0..1000 {
        ctrl.power(i32::from(target));
    }

    assert!(!cal.check_ready(1_000 + SETTLE_DELAY_MS - 1, &state));
    assert!(cal.check_ready(1_000 + SETTLE_DELAY_MS, &state));

    // Recording disarms the delay until the next point starts
    cal.record(real_temp(target), target);
    assert!(!cal.check_ready(100_000, &state));
}

#[test]
fn test_stability_window() {
    assert!(AutoCalibration::is_stable(1000, 1010, 100, 30));
    assert!(!AutoCalibration::is_stable(1000, 1020, 100, 30));
    assert!(!AutoCalibration::is_stable(1000, 1000, 500, 30));
    assert!(!AutoCalibration::is_stable(1000, 1000, 100, 1));
}

#[test]
fn test_gun_fit_uses_gun_references() {
    let samples: Vec<CalibrationSample> = [200u16, 300, 400]
        .iter()
        .map(|&real_c| CalibrationSample {
            real_c,
            internal: real_c * 3 + 50,
        })
        .collect();

    let points = calibration_ols(&samples, 150, 500, Device::Gun).unwrap();

    assert_eq!(points, [650, 950, 1250, 1550]);
}

#[test]
fn test_manual_curve_repair_keeps_points_apart() {
    let mut points = [900, 950, 1000, 1100];

    build_calibration(&mut points, 0);

    assert_eq!(points, [900, 1100, 1300, 1500]);
    for pair in points.windows(2) {
        assert!(pair[1] - pair[0] >= MIN_POINT_GAP);
    }
    assert!(points[3] <= INT_TEMP_MAX);
}

#[test]
fn test_manual_curve_repair_from_any_edit() {
    let values = [0u16, 100, 190, 600, 1500, 3500, 3690, 4000];
    for &a in &values {
        for &b in &values {
            for &c in &values {
                for &d in &values {
                    for ref_point in 0..4 {
                        let mut points = [a, b, c, d];
                        build_calibration(&mut points, ref_point);
                        for pair in points.windows(2) {
                            assert!(
                                pair[1] >= pair[0] + MIN_POINT_GAP,
                                "{:?} ref={} -> {:?}",
                                [a, b, c, d],
                                ref_point,
                                points
                            );
                        }
                        assert!(points[3] <= INT_TEMP_MAX);
                    }
                }
            }
        }
    }
}

#[test]
fn test_temp_celsius_is_monotonic() {
    let ctx = TipCalibrationContext::new();

    for device in [Device::Iron, Device::Gun] {
        let mut last = 0;
        for raw in 0..=INT_TEMP_MAX {
            let t = ctx.temp_celsius(raw, 25, Some(device));
            assert!(t >= last, "{:?}: raw={} t={} last={}", device, raw, t, last);
            last = t;
        }
    }
}
