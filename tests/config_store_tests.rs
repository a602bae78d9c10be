//! Integration tests for the configuration store
//!
//! Tests the configuration lifecycle including:
//! - Boot from blank, missing and corrupted storage
//! - Save / reload round trip and the dirty check
//! - Unit conversion between internal units and Celsius / Fahrenheit
//! - Setup menu, boost, PID persistence and factory reset

mod common;

use common::{store_with, MemStorage, RecordingFeedback, TestStore};
use solder_station::config::{ConfigRecord, StationSetup, MAX_OFF_TIMEOUT};
use solder_station::heater::PidParams;
use solder_station::tips::{CalibrationCurve, TipMask, TIP_COUNT};
use solder_station::units::{celsius_to_fahrenheit, INT_TEMP_MAX};
use solder_station::{ConfigStatus, ConfigStore};

fn setup_of(store: &TestStore) -> StationSetup {
    StationSetup {
        off_timeout: store.off_timeout(),
        buzzer: store.is_buzzer_enabled(),
        celsius: store.is_celsius(),
        keep_iron: store.is_keep_iron(),
        reed_switch: store.is_reed_switch(),
        big_step: store.is_big_step(),
        auto_start: store.is_auto_start(),
        low_temp: store.low_temp(),
        low_timeout: store.low_timeout(),
        scr_save_timeout: store.scr_save_timeout(),
    }
}

fn reopen(store: &TestStore) -> TestStore {
    store_with(store.storage().clone())
}

// ============================================================================
// Boot
// ============================================================================

#[test]
fn test_blank_storage_boots_on_defaults() {
    let mut store = ConfigStore::new(MemStorage::new(8), RecordingFeedback::default());

    assert_eq!(store.init(), ConfigStatus::NoTip);
    assert_eq!(store.iron_preset_human(), 235);
    assert_eq!(store.gun_preset_human(), 300);
    assert_eq!(store.gun_fan_speed(), 1200);
    assert!(store.is_celsius());
    assert!(store.is_buzzer_enabled());
    assert_eq!(store.current_tip_index(), 1);
    assert_eq!(store.tip_name().as_str(), "T12-B");
    assert_eq!(store.tip_calibration(), CalibrationCurve::DEFAULT.points);
    assert!(!store.is_tip_calibrated());
    assert_eq!(store.feedback().low, 1);
}

#[test]
fn test_missing_storage_reports_read_error() {
    let mut store = ConfigStore::new(MemStorage::missing(), RecordingFeedback::default());

    assert_eq!(store.init(), ConfigStatus::ReadError);
    assert_eq!(*store.record(), ConfigRecord::DEFAULT);
    assert_eq!(store.tip_calibration(), CalibrationCurve::DEFAULT.points);
    // Nothing changed, so nothing has to be written
    assert!(store.save_config());
    assert_eq!(store.storage().config_writes, 0);
}

#[test]
fn test_corrupted_record_falls_back_to_defaults() {
    let mut storage = MemStorage::new(4);
    let mut record = ConfigRecord::DEFAULT;
    record.iron_temp = 300;
    storage.config = record.encode();
    storage.config[10] ^= 0x5A;

    let store = store_with(storage);

    assert_eq!(*store.record(), ConfigRecord::DEFAULT);
}

#[test]
fn test_loaded_record_is_corrected() {
    let mut storage = MemStorage::new(4);
    let mut record = ConfigRecord::DEFAULT;
    record.iron_temp = 600;
    record.off_timeout = 99;
    record.tip = 0;
    storage.config = record.encode();

    let store = store_with(storage);

    assert_eq!(store.iron_preset_human(), 450);
    assert_eq!(store.off_timeout(), MAX_OFF_TIMEOUT);
    assert_eq!(store.current_tip_index(), 1);
}

// ============================================================================
// Save / reload
// ============================================================================

#[test]
fn test_save_and_reload_round_trip() {
    let mut store = store_with(MemStorage::new(4));
    store.save_preset_temp_human(320);
    store.save_gun_preset(350, 1500);
    store.save_boost(25, 60);

    assert!(store.save_config());
    assert_eq!(store.storage().config_writes, 1);

    let reloaded = reopen(&store);
    assert_eq!(reloaded.iron_preset_human(), 320);
    assert_eq!(reloaded.gun_preset_human(), 350);
    assert_eq!(reloaded.gun_fan_speed(), 1500);
    assert_eq!(reloaded.boost().increment, 25);
    assert_eq!(reloaded.boost().duration_secs, 60);
    assert_eq!(reloaded.record().id, 1);
    assert!(reloaded.record().same_settings(store.record()));
}

#[test]
fn test_unchanged_config_is_not_written() {
    let mut store = store_with(MemStorage::new(4));

    assert!(store.save_config());
    assert!(store.save_config());
    assert_eq!(store.storage().config_writes, 0);

    store.save_preset_temp_human(300);
    assert!(store.save_config());
    assert!(store.save_config());
    assert_eq!(store.storage().config_writes, 1);
}

#[test]
fn test_failed_save_keeps_last_saved_copy() {
    let mut store = store_with(MemStorage::new(4));
    store.storage_mut().fail_writes = true;
    store.save_preset_temp_human(250);

    assert!(!store.save_config());
    assert_eq!(store.saved_record().iron_temp, 235);
    assert_eq!(store.iron_preset_human(), 250);

    // Still dirty: the next attempt writes
    store.storage_mut().fail_writes = false;
    assert!(store.save_config());
    assert_eq!(store.storage().config_writes, 1);
    assert_eq!(store.saved_record().iron_temp, 250);
}

#[test]
fn test_restore_discards_unsaved_changes() {
    let mut store = store_with(MemStorage::new(4));
    store.save_preset_temp_human(400);

    store.restore_config();

    assert_eq!(store.iron_preset_human(), 235);
}

#[test]
fn test_record_id_skips_erased_marker() {
    let mut storage = MemStorage::new(4);
    let mut record = ConfigRecord::DEFAULT;
    record.id = u32::MAX - 1;
    storage.config = record.encode();

    let mut store = store_with(storage);
    store.save_preset_temp_human(240);
    assert!(store.save_config());

    let saved = ConfigRecord::decode(&store.storage().config).unwrap();
    assert_eq!(saved.id, 0);
    assert_eq!(saved.iron_temp, 240);
}

#[test]
fn test_save_pid_always_writes() {
    let mut store = store_with(MemStorage::new(4));
    let params = PidParams::new(1500, 40, 600);

    assert!(store.save_pid(params, true));
    assert!(store.save_pid(params, true));

    assert_eq!(store.storage().config_writes, 2);
    assert_eq!(store.pid_params(true), params);
    assert_eq!(store.pid_params(false), ConfigRecord::DEFAULT.gun_pid);
    assert_eq!(reopen(&store).pid_params(true), params);
}

// ============================================================================
// Unit conversion
// ============================================================================

#[test]
fn test_default_curve_reference_point() {
    let store = store_with(MemStorage::new(4));

    assert_eq!(store.temp_to_human(964, 25, None), 260);
}

#[test]
fn test_fahrenheit_display() {
    let mut store = store_with(MemStorage::new(4));
    let mut setup = setup_of(&store);
    setup.celsius = false;
    store.setup(setup);

    assert_eq!(store.temp_to_human(964, 25, None), 500);
    // Presets follow the unit change
    assert_eq!(store.iron_preset_human(), 455);
    assert_eq!(store.gun_preset_human(), 572);
}

#[test]
fn test_human_to_temp_is_exact_in_celsius() {
    let store = store_with(MemStorage::new(4));

    for t in store.temp_min_c()..=store.temp_max_c() {
        let internal = store.human_to_temp(t, 25);
        assert!(internal <= INT_TEMP_MAX);
        assert_eq!(store.temp_to_human(internal, 25, None), t, "t={}", t);
    }
}

#[test]
fn test_human_to_temp_is_exact_in_fahrenheit() {
    let mut store = store_with(MemStorage::new(4));
    let mut setup = setup_of(&store);
    setup.celsius = false;
    store.setup(setup);

    for gun in [false, true] {
        store.activate_gun(gun);
        let lo = celsius_to_fahrenheit(i32::from(store.temp_min_c())) as u16;
        let hi = celsius_to_fahrenheit(i32::from(store.temp_max_c())) as u16;
        for ambient in [20i16, 25, 35] {
            // Every value some internal reading displays as
            let mut last = None;
            for internal in 0..=INT_TEMP_MAX {
                let t = store.temp_to_human(internal, ambient, None);
                if t < lo || t > hi || last == Some(t) {
                    continue;
                }
                last = Some(t);
                let back = store.temp_to_human(store.human_to_temp(t, ambient), ambient, None);
                assert_eq!(back, t, "gun={} ambient={} t={}", gun, ambient, t);
            }
        }
    }
}

#[test]
fn test_human_to_temp_clamps_to_device_range() {
    let store = store_with(MemStorage::new(4));

    let low = store.human_to_temp(20, 25);
    let high = store.human_to_temp(900, 25);

    assert_eq!(store.temp_to_human(low, 25, None), store.temp_min_c());
    assert_eq!(store.temp_to_human(high, 25, None), store.temp_max_c());
}

#[test]
fn test_low_temp_internal() {
    let mut store = store_with(MemStorage::new(4));
    let mut setup = setup_of(&store);
    setup.low_temp = 150;
    store.setup(setup);

    // (150 - 25) * 680 / (200 - 25)
    assert_eq!(store.low_temp_internal(25), 485);

    setup.low_temp = 300;
    store.setup(setup);
    assert_eq!(store.low_temp_internal(25), 680);
    assert_eq!(store.low_temp(), 200);
}

// ============================================================================
// Setup, boost, factory reset
// ============================================================================

#[test]
fn test_setup_updates_flags_and_timeouts() {
    let mut store = store_with(MemStorage::new(4));
    let setup = StationSetup {
        off_timeout: 10,
        buzzer: false,
        celsius: true,
        keep_iron: true,
        reed_switch: true,
        big_step: true,
        auto_start: true,
        low_temp: 180,
        low_timeout: 12,
        scr_save_timeout: 5,
    };

    store.setup(setup);

    assert_eq!(setup_of(&store), setup);
    assert!(store.save_config());
    assert_eq!(setup_of(&reopen(&store)), setup);
}

#[test]
fn test_boost_rounds_up_to_steps() {
    let mut store = store_with(MemStorage::new(4));

    store.save_boost(23, 45);
    assert_eq!(store.boost().increment, 25);
    assert_eq!(store.boost().duration_secs, 60);

    store.save_boost(200, 1000);
    assert_eq!(store.boost().increment, 75);
    assert_eq!(store.boost().duration_secs, 320);

    store.save_boost(0, 20);
    assert!(!store.boost().is_enabled());
}

#[test]
fn test_boost_round_trip_rounds_up() {
    let mut store = store_with(MemStorage::new(4));

    for increment in 0..=75u8 {
        for duration in 5..=320u16 {
            store.save_boost(increment, duration);
            let boost = store.boost();
            assert_eq!(boost.increment, increment.div_ceil(5) * 5, "increment={}", increment);
            assert_eq!(boost.duration_secs, duration.div_ceil(20) * 20, "duration={}", duration);
        }
    }
}

#[test]
fn test_factory_reset() {
    let mut store = store_with(MemStorage::new(4));
    assert!(store.save_tip_calibration(3, [700, 1000, 1300, 1700], TipMask::ACTIVE_CALIBRATED, 25));
    assert!(store.change_tip(3));
    store.save_preset_temp_human(300);

    assert!(store.init_config_area());

    let storage = store.storage();
    assert_eq!(storage.erases, 1);
    assert!(storage.chunks.iter().all(|c| c.iter().all(|&b| b == 0xFF)));
    let saved = ConfigRecord::decode(&storage.config).unwrap();
    assert!(saved.same_settings(&ConfigRecord::DEFAULT));
    assert!(store.registry().entry(3).unwrap().chunk.is_none());
    assert_eq!(store.tip_calibration(), CalibrationCurve::DEFAULT.points);
    assert_eq!(store.iron_preset_human(), 235);
}

#[test]
fn test_change_tip_rejects_gun_and_unknown_slots() {
    let mut store = store_with(MemStorage::new(4));

    assert!(!store.change_tip(0));
    assert!(!store.change_tip(TIP_COUNT));
    // Tip never stored
    assert!(!store.change_tip(2));
    assert_eq!(store.current_tip_index(), 1);
    assert_eq!(store.storage().config_writes, 0);
}
