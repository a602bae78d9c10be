//! Module: config::store
//!
//! Purpose: Configuration record lifecycle and tip calibration persistence.
//!
//! Architecture:
//! ```text
//!              ┌──────────── ConfigStore ────────────┐
//! main loop ──▶│ active ◀─ restore ─ spare           │
//!              │   │ save (dirty check) ──▶ spare    │
//!              │ TipRegistry   TipCalibrationContext │
//!              └───────────────┬─────────────────────┘
//!                              ▼
//!                       StorageBackend
//! ```
//!
//! - `active` is mutated by setters, `spare` is the last persisted copy
//! - Persistence failures degrade to defaults, never panic
//! - Only `init` reports a status; everything else returns `bool` and beeps
//!
//! Safety: main-loop only. Not used from the sampling callback.

use heapless::Vec;

use super::record::{Boost, ConfigFlags, ConfigRecord};
use crate::feedback::Feedback;
use crate::heater::PidParams;
use crate::log_globals::MAIN_LOG;
use crate::storage::{ChunkRead, StorageBackend, CONFIG_RECORD_SIZE};
use crate::tips::{
    full_tip_name, load_tip, save_tip, Device, RegistryEntry, TipCalibrationContext, TipMask, TipName, TipRecord,
    TipRegistry, TIP_COUNT,
};
use crate::units::{celsius_to_fahrenheit, constrain, fahrenheit_to_celsius, map, INT_TEMP_MAX};
use crate::{rt_error, rt_info, rt_warn};

/// Bisection steps in [`ConfigStore::human_to_temp`].
const INVERSE_ITERATIONS: usize = 20;

/// Result of [`ConfigStore::init`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigStatus {
    /// Storage readable, at least one tip indexed.
    Ok,
    /// Storage readable, but no tip record was found.
    NoTip,
    /// Storage not available; running on defaults.
    ReadError,
}

/// One row of a tip selection list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TipListItem {
    pub index: usize,
    pub mask: TipMask,
    pub name: TipName,
}

/// Main station parameters written together from the setup menu.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StationSetup {
    pub off_timeout: u8,
    pub buzzer: bool,
    pub celsius: bool,
    pub keep_iron: bool,
    pub reed_switch: bool,
    pub big_step: bool,
    pub auto_start: bool,
    pub low_temp: u16,
    pub low_timeout: u8,
    pub scr_save_timeout: u8,
}

/// Persisted station configuration and the calibration of the tips in use.
pub struct ConfigStore<S: StorageBackend, F: Feedback> {
    storage: S,
    feedback: F,
    active: ConfigRecord,
    spare: ConfigRecord,
    registry: TipRegistry,
    tips: TipCalibrationContext,
}

impl<S: StorageBackend, F: Feedback> ConfigStore<S, F> {
    pub fn new(storage: S, feedback: F) -> Self {
        Self {
            storage,
            feedback,
            active: ConfigRecord::DEFAULT,
            spare: ConfigRecord::DEFAULT,
            registry: TipRegistry::new(),
            tips: TipCalibrationContext::new(),
        }
    }

    /// Load the configuration and the calibration of the configured tip.
    ///
    /// Falls back to defaults on any storage problem; never fails. A low
    /// beep signals that no tip is activated yet.
    pub fn init(&mut self) -> ConfigStatus {
        self.tips.activate_gun(false);
        if !self.storage.init() {
            rt_error!(MAIN_LOG, "storage not available, using defaults");
            self.active = ConfigRecord::DEFAULT;
            self.registry = TipRegistry::new();
            self.tips.default_calibration(Device::Gun);
            self.select_tip(usize::from(self.active.tip));
            self.sync_config();
            return ConfigStatus::ReadError;
        }

        let tips_loaded = self.registry.build(&mut self.storage);
        match self.load_record() {
            Some(mut record) => {
                record.correct();
                self.active = record;
            }
            None => {
                rt_warn!(MAIN_LOG, "config record missing or corrupted, using defaults");
                self.active = ConfigRecord::DEFAULT;
            }
        }

        self.select_tip(0);
        self.select_tip(usize::from(self.active.tip));
        self.sync_config();
        if tips_loaded > 0 {
            ConfigStatus::Ok
        } else {
            self.low_beep();
            ConfigStatus::NoTip
        }
    }

    fn load_record(&mut self) -> Option<ConfigRecord> {
        let mut buf = [0u8; CONFIG_RECORD_SIZE];
        if let Err(e) = self.storage.read_config(&mut buf) {
            rt_warn!(MAIN_LOG, "config read failed: {:?}", e);
            return None;
        }
        ConfigRecord::decode(&buf)
    }

    /// Bump the id and write the active record. Does not touch `spare`.
    fn write_record(&mut self) -> bool {
        let mut id = self.active.id.wrapping_add(1);
        if id == u32::MAX {
            id = 0;
        }
        self.active.id = id;
        match self.storage.write_config(&self.active.encode()) {
            Ok(()) => true,
            Err(e) => {
                rt_error!(MAIN_LOG, "config write failed: {:?}", e);
                false
            }
        }
    }

    #[inline]
    fn sync_config(&mut self) {
        self.spare = self.active;
    }

    /// Load the calibration of tip slot `index` into its device slot.
    ///
    /// Slot 0 is the hot air gun. The default curve is used when the tip has
    /// no stored record, the record is unreadable, not calibrated or not
    /// increasing. Returns `true` if the tip's stored record was read.
    pub fn select_tip(&mut self, index: usize) -> bool {
        let device = if index == 0 { Device::Gun } else { Device::Iron };
        let Some(chunk) = self.registry.entry(index).and_then(|e| e.chunk) else {
            self.tips.default_calibration(device);
            return false;
        };
        match load_tip(&mut self.storage, chunk) {
            ChunkRead::Ok(tip) => {
                if tip.mask.is_calibrated() && tip.is_valid() {
                    self.tips.load(&tip, device);
                } else {
                    self.tips.default_calibration(device);
                }
                true
            }
            ChunkRead::Invalid | ChunkRead::IoError => {
                rt_warn!(MAIN_LOG, "tip {} chunk {} unreadable", index, chunk);
                self.tips.default_calibration(device);
                false
            }
        }
    }

    /// Switch to iron tip `index` and persist the choice if it loaded.
    pub fn change_tip(&mut self, index: usize) -> bool {
        if index == 0 || index >= TIP_COUNT {
            return false;
        }
        if !self.select_tip(index) {
            return false;
        }
        self.active.tip = index as u8;
        self.save_config()
    }

    /// Persist the active record if it differs from the last saved one.
    ///
    /// Returns `false` only if a write was needed and failed.
    pub fn save_config(&mut self) -> bool {
        if self.active.same_settings(&self.spare) {
            return true;
        }
        if !self.write_record() {
            return false;
        }
        self.sync_config();
        true
    }

    /// Discard unsaved changes.
    pub fn restore_config(&mut self) {
        self.active = self.spare;
    }

    // ----------------------------------------------------------------------
    // Unit conversion
    // ----------------------------------------------------------------------

    /// Internal units to the configured human unit.
    pub fn temp_to_human(&self, temp: u16, ambient: i16, force: Option<Device>) -> u16 {
        let t = self.tips.temp_celsius(temp, ambient, force);
        if self.is_celsius() {
            t
        } else {
            celsius_to_fahrenheit(i32::from(t)) as u16
        }
    }

    /// Human temperature to internal units for the active device.
    ///
    /// `t` is clamped to the device range first. The forward mapping is not
    /// exactly invertible, so the result is found by bisection over
    /// `[0, INT_TEMP_MAX]`.
    pub fn human_to_temp(&self, t: u16, ambient: i16) -> u16 {
        let d = i32::from(ambient) - i32::from(self.tips.ambient_temp());
        let mut t_lo = i32::from(self.tips.reference_temp(0, None)) + d;
        let mut t_hi = i32::from(self.tips.reference_temp(3, None)) + d;
        let mut t_min = i32::from(self.tips.temp_min_c());
        let mut t_max = i32::from(self.tips.temp_max_c());
        if !self.is_celsius() {
            t_lo = celsius_to_fahrenheit(t_lo);
            t_hi = celsius_to_fahrenheit(t_hi);
            t_min = celsius_to_fahrenheit(t_min);
            t_max = celsius_to_fahrenheit(t_max);
        }
        let t = constrain(i32::from(t), t_min, t_max);

        let mut left: i32 = 0;
        let mut right: i32 = i32::from(INT_TEMP_MAX);
        let cal_lo = i32::from(self.tips.calibration(0));
        let cal_hi = i32::from(self.tips.calibration(3));
        let mut temp = map(t, t_lo, t_hi, cal_lo, cal_hi);
        // Start a quarter range toward the middle
        if temp > (left + right) / 2 {
            temp -= (right - left) / 4;
        } else {
            temp += (right - left) / 4;
        }
        temp = constrain(temp, left, right);

        for _ in 0..INVERSE_ITERATIONS {
            let human = i32::from(self.temp_to_human(temp as u16, ambient, None));
            if human == t {
                break;
            }
            if human < t {
                left = temp;
            } else {
                right = temp;
            }
            let mut next = (left + right) / 2;
            if next == temp {
                next += if human < t { 1 } else { -1 };
            }
            temp = constrain(next, 0, i32::from(INT_TEMP_MAX));
        }
        temp as u16
    }

    /// Standby temperature in internal units.
    ///
    /// The stored value is clamped to `[ambient, ref0]` (and kept clamped),
    /// then mapped linearly onto `[0, calibration0]`.
    pub fn low_temp_internal(&mut self, ambient: i16) -> u16 {
        let t_ref = i32::from(self.tips.reference_temp(0, None));
        let amb = i32::from(ambient);
        let low = constrain(i32::from(self.active.low_temp), amb, t_ref);
        self.active.low_temp = low.max(0) as u16;
        let cal0 = i32::from(self.tips.calibration(0));
        map(low, amb, t_ref, 0, cal0).clamp(0, i32::from(INT_TEMP_MAX)) as u16
    }

    // ----------------------------------------------------------------------
    // Tips
    // ----------------------------------------------------------------------

    /// Up to `N` tips for a selection list, starting with the listed tip just
    /// before `start`. The gun slot is never listed.
    pub fn tip_list<const N: usize>(&self, start: usize, active_only: bool) -> Vec<TipListItem, N> {
        let mut list = Vec::new();
        if N == 0 {
            return list;
        }
        let listed = |entry: &RegistryEntry| !active_only || entry.mask.is_active();
        let item = |index: usize, entry: &RegistryEntry| TipListItem {
            index,
            mask: entry.mask,
            name: full_tip_name(index),
        };

        let before = (1..start.min(TIP_COUNT))
            .rev()
            .find_map(|i| self.registry.entry(i).filter(|e| listed(*e)).map(|e| item(i, e)));
        if let Some(first) = before {
            let _ = list.push(first);
        }
        for index in start.max(1)..TIP_COUNT {
            let Some(entry) = self.registry.entry(index) else {
                break;
            };
            if !listed(entry) {
                continue;
            }
            if list.push(item(index, entry)).is_err() {
                break;
            }
        }
        list
    }

    /// Write a tip calibration record, allocating a chunk if the tip has
    /// none. Does not change the curve in use.
    ///
    /// Beeps on the outcome. Returns `false` if nothing was written.
    pub fn save_tip_calibration(&mut self, index: usize, points: [u16; 4], mask: TipMask, ambient: i8) -> bool {
        let Some(mut tip) = TipRecord::for_tip(index, mask) else {
            self.failed_beep();
            return false;
        };
        tip.points = points;
        tip.ambient = ambient;
        if !tip.is_valid() {
            rt_warn!(MAIN_LOG, "tip {}: calibration points not increasing", index);
            self.failed_beep();
            return false;
        }

        let chunk = match self.registry.entry(index).and_then(|e| e.chunk) {
            Some(chunk) => chunk,
            None => match self.registry.free_chunk(self.storage.chunk_count()) {
                Some(chunk) => chunk,
                None => {
                    rt_warn!(MAIN_LOG, "tip {}: no free calibration chunk", index);
                    self.failed_beep();
                    return false;
                }
            },
        };

        if save_tip(&mut self.storage, chunk, &tip).is_err() {
            rt_error!(MAIN_LOG, "tip {}: write to chunk {} failed", index, chunk);
            self.failed_beep();
            return false;
        }
        self.registry.assign(index, chunk, mask);
        self.short_beep();
        true
    }

    /// Flip the active flag of tip `index` in storage.
    ///
    /// A tip without a record gets a fresh one in a free chunk; that write is
    /// verified by re-reading the chunk past any cache.
    pub fn toggle_tip_activation(&mut self, index: usize) -> bool {
        if index >= TIP_COUNT {
            return false;
        }
        match self.registry.entry(index).and_then(|e| e.chunk) {
            Some(chunk) => {
                let ChunkRead::Ok(mut tip) = load_tip(&mut self.storage, chunk) else {
                    return false;
                };
                tip.mask = tip.mask.toggled_active();
                if save_tip(&mut self.storage, chunk, &tip).is_err() {
                    return false;
                }
                self.registry.set_mask(index, tip.mask);
                true
            }
            None => {
                let Some(tip) = TipRecord::for_tip(index, TipMask::ACTIVE) else {
                    return false;
                };
                let Some(chunk) = self.registry.free_chunk(self.storage.chunk_count()) else {
                    rt_warn!(MAIN_LOG, "tip {}: no free chunk to activate", index);
                    return false;
                };
                if save_tip(&mut self.storage, chunk, &tip).is_err() || !self.verify_tip(chunk, &tip) {
                    rt_error!(MAIN_LOG, "tip {}: activation did not land in chunk {}", index, chunk);
                    return false;
                }
                self.registry.assign(index, chunk, tip.mask);
                true
            }
        }
    }

    fn verify_tip(&mut self, chunk: u8, tip: &TipRecord) -> bool {
        self.storage.force_reload_next();
        match load_tip(&mut self.storage, chunk) {
            ChunkRead::Ok(read) => read.name == tip.name,
            _ => false,
        }
    }

    /// Drop the calibrated flag of every stored tip. Stops at the first
    /// storage failure.
    pub fn clear_all_calibrations(&mut self) -> bool {
        self.registry.clear_all_calibrations(&mut self.storage)
    }

    /// Factory reset: erase storage and write the default configuration.
    pub fn init_config_area(&mut self) -> bool {
        rt_info!(MAIN_LOG, "erasing configuration area");
        let erased = self.storage.erase().is_ok();
        self.active = ConfigRecord::DEFAULT;
        let written = self.write_record();
        self.registry = TipRegistry::new();
        self.tips.default_calibration(Device::Gun);
        self.tips.default_calibration(Device::Iron);
        self.sync_config();
        erased && written
    }

    /// Catalog slot in use: 0 while the gun is active.
    pub fn current_tip_index(&self) -> usize {
        if self.tips.gun_active() {
            0
        } else {
            usize::from(self.active.tip)
        }
    }

    /// Display name of the tip in use.
    pub fn tip_name(&self) -> TipName {
        full_tip_name(self.current_tip_index())
    }

    #[inline]
    pub fn is_tip_calibrated(&self) -> bool {
        self.tips.is_calibrated()
    }

    /// Calibration points of the active device.
    #[inline]
    pub fn tip_calibration(&self) -> [u16; 4] {
        self.tips.active_curve().points
    }

    /// Use freshly measured points for the active device (not persisted).
    #[inline]
    pub fn apply_tip_calibration(&mut self, points: [u16; 4], ambient: i8) {
        self.tips.apply_tip_calibration(points, ambient);
    }

    #[inline]
    pub fn reset_tip_calibration(&mut self) {
        self.tips.reset_tip_calibration();
    }

    #[inline]
    pub fn activate_gun(&mut self, gun: bool) {
        self.tips.activate_gun(gun);
    }

    #[inline]
    pub fn reference_temp(&self, index: usize, force: Option<Device>) -> u16 {
        self.tips.reference_temp(index, force)
    }

    #[inline]
    pub fn temp_min_c(&self) -> u16 {
        self.tips.temp_min_c()
    }

    #[inline]
    pub fn temp_max_c(&self) -> u16 {
        self.tips.temp_max_c()
    }

    #[inline]
    pub fn calibration_context(&self) -> &TipCalibrationContext {
        &self.tips
    }

    #[inline]
    pub fn registry(&self) -> &TipRegistry {
        &self.registry
    }

    // ----------------------------------------------------------------------
    // Settings
    // ----------------------------------------------------------------------

    #[inline]
    pub fn record(&self) -> &ConfigRecord {
        &self.active
    }

    /// Last persisted (or loaded) record.
    #[inline]
    pub fn saved_record(&self) -> &ConfigRecord {
        &self.spare
    }

    #[inline]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    #[inline]
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    #[inline]
    pub fn feedback(&self) -> &F {
        &self.feedback
    }

    #[inline]
    pub fn is_celsius(&self) -> bool {
        self.active.is_celsius()
    }

    #[inline]
    pub fn is_buzzer_enabled(&self) -> bool {
        self.active.flags.has(ConfigFlags::BUZZER)
    }

    #[inline]
    pub fn is_keep_iron(&self) -> bool {
        self.active.flags.has(ConfigFlags::KEEP_IRON)
    }

    #[inline]
    pub fn is_reed_switch(&self) -> bool {
        self.active.flags.has(ConfigFlags::REED_SWITCH)
    }

    #[inline]
    pub fn is_auto_start(&self) -> bool {
        self.active.flags.has(ConfigFlags::AUTO_START)
    }

    #[inline]
    pub fn is_big_step(&self) -> bool {
        self.active.flags.has(ConfigFlags::BIG_STEP)
    }

    /// Iron preset in the configured unit.
    #[inline]
    pub fn iron_preset_human(&self) -> u16 {
        self.active.iron_temp
    }

    #[inline]
    pub fn gun_preset_human(&self) -> u16 {
        self.active.gun_temp
    }

    #[inline]
    pub fn gun_fan_speed(&self) -> u16 {
        self.active.gun_fan_speed
    }

    #[inline]
    pub fn low_temp(&self) -> u16 {
        self.active.low_temp
    }

    /// Standby timeout, 5-second units.
    #[inline]
    pub fn low_timeout(&self) -> u8 {
        self.active.low_timeout
    }

    #[inline]
    pub fn scr_save_timeout(&self) -> u8 {
        self.active.scr_save_timeout
    }

    #[inline]
    pub fn off_timeout(&self) -> u8 {
        self.active.off_timeout
    }

    pub fn save_preset_temp_human(&mut self, temp: u16) {
        self.active.iron_temp = temp;
    }

    pub fn save_gun_preset(&mut self, temp: u16, fan: u16) {
        self.active.gun_temp = temp;
        self.active.gun_fan_speed = fan;
    }

    #[inline]
    pub fn boost(&self) -> Boost {
        Boost::decode(self.active.boost)
    }

    pub fn save_boost(&mut self, increment: u8, duration_secs: u16) {
        self.active.boost = Boost::encode(increment, duration_secs);
    }

    /// Apply the setup menu. Presets are converted when the unit changes.
    pub fn setup(&mut self, s: StationSetup) {
        let rec = &mut self.active;
        rec.off_timeout = s.off_timeout;
        rec.scr_save_timeout = s.scr_save_timeout;
        rec.low_temp = s.low_temp;
        rec.low_timeout = s.low_timeout;
        if rec.is_celsius() != s.celsius {
            let convert: fn(i32) -> i32 = if s.celsius {
                fahrenheit_to_celsius
            } else {
                celsius_to_fahrenheit
            };
            rec.iron_temp = convert(i32::from(rec.iron_temp)).max(0) as u16;
            rec.gun_temp = convert(i32::from(rec.gun_temp)).max(0) as u16;
        }
        let mut flags = ConfigFlags::default();
        flags.set(ConfigFlags::CELSIUS, s.celsius);
        flags.set(ConfigFlags::BUZZER, s.buzzer);
        flags.set(ConfigFlags::KEEP_IRON, s.keep_iron);
        flags.set(ConfigFlags::REED_SWITCH, s.reed_switch);
        flags.set(ConfigFlags::BIG_STEP, s.big_step);
        flags.set(ConfigFlags::AUTO_START, s.auto_start);
        rec.flags = flags;
    }

    /// PID coefficients persisted for the iron or the gun.
    pub fn pid_params(&self, iron: bool) -> PidParams {
        if iron {
            self.active.iron_pid
        } else {
            self.active.gun_pid
        }
    }

    /// Soft coefficients used while calibrating.
    #[inline]
    pub fn pid_params_smooth(&self, iron: bool) -> PidParams {
        PidParams::smooth(iron)
    }

    /// Store tuned PID coefficients. Always writes.
    pub fn save_pid(&mut self, params: PidParams, iron: bool) -> bool {
        if iron {
            self.active.iron_pid = params;
        } else {
            self.active.gun_pid = params;
        }
        if !self.write_record() {
            return false;
        }
        self.sync_config();
        true
    }

    // ----------------------------------------------------------------------
    // Feedback
    // ----------------------------------------------------------------------

    fn short_beep(&mut self) {
        if self.is_buzzer_enabled() {
            self.feedback.short_beep();
        }
    }

    fn low_beep(&mut self) {
        if self.is_buzzer_enabled() {
            self.feedback.low_beep();
        }
    }

    fn failed_beep(&mut self) {
        if self.is_buzzer_enabled() {
            self.feedback.failed_beep();
        }
    }
}
