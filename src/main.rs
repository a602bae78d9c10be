//! SolderStation - firmware entry point (ESP-IDF).
//!
//! 1. Open NVS and load the configuration
//! 2. Program the heater target from the iron preset
//! 3. Main loop: drain logs, surface faults, follow the handle temperature,
//!    persist dirty settings
//!
//! The ADC/timer glue that calls `HeaterController::power()` from the
//! sampling interrupt is board specific and lives with the board support.

#![no_std]
#![no_main]

use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys as esp_idf_sys;

use solder_station::config::{ConfigStatus, ConfigStore, NvsStorage};
use solder_station::feedback::Silent;
use solder_station::timing::Deadline;
use solder_station::uart_logger::{self, UartLoggerConfig};
use solder_station::{rt_error, rt_info, rt_warn, FaultCode, FaultState, HeaterState, MAIN_LOG};

/// Shared with the sampling callback.
static HEATER: HeaterState = HeaterState::new();
static FAULT: FaultState = FaultState::new();

/// How often unsaved settings are flushed.
const SAVE_PERIOD_MS: u32 = 10_000;

#[no_mangle]
fn main() {
    esp_idf_sys::link_patches();

    let storage = match EspDefaultNvsPartition::take() {
        Ok(partition) => NvsStorage::new(partition).unwrap_or_else(|e| {
            rt_error!(MAIN_LOG, "NVS open failed: {:?}", e);
            NvsStorage::unavailable()
        }),
        Err(e) => {
            rt_error!(MAIN_LOG, "NVS partition unavailable: {:?}", e);
            NvsStorage::unavailable()
        }
    };

    let mut cfg = ConfigStore::new(storage, Silent);
    match cfg.init() {
        ConfigStatus::Ok => rt_info!(MAIN_LOG, "config loaded, tip {}", cfg.tip_name().as_str()),
        ConfigStatus::NoTip => rt_warn!(MAIN_LOG, "no tips activated"),
        ConfigStatus::ReadError => FAULT.set(FaultCode::StorageIo, u32::MAX),
    }

    // Default ambient until the sampling callback publishes a reading
    let mut ambient = HEATER.ambient_temp();
    HEATER.load_pid(cfg.pid_params(true));
    HEATER.set_temp(cfg.human_to_temp(cfg.iron_preset_human(), ambient));
    rt_info!(
        MAIN_LOG,
        "preset {} -> internal {}",
        cfg.iron_preset_human(),
        HEATER.preset_temp()
    );

    let mut uart = Peripherals::take().ok().and_then(|p| {
        uart_logger::init_uart_logger(p.uart0, p.pins.gpio43, &UartLoggerConfig::default()).ok()
    });

    let mut save_at = Deadline::after(now_ms(), SAVE_PERIOD_MS);
    loop {
        if let Some(uart) = uart.as_mut() {
            uart_logger::drain_to_uart(uart);
        }

        if let Some(fault) = FAULT.take() {
            rt_warn!(MAIN_LOG, "fault: {} data={} count={}", fault.code.as_str(), fault.data, fault.count);
            if fault.code.cuts_power() {
                HEATER.switch_power(false);
            }
        }

        // Keep the internal target on the human preset as the handle warms
        let sensed = HEATER.ambient_temp();
        if sensed != ambient {
            ambient = sensed;
            HEATER.adjust(cfg.human_to_temp(cfg.iron_preset_human(), ambient));
        }

        let now = now_ms();
        if save_at.expired(now) {
            if !cfg.save_config() {
                FAULT.set(FaultCode::StorageIo, u32::MAX);
            }
            save_at = Deadline::after(now, SAVE_PERIOD_MS);
        }

        unsafe {
            esp_idf_sys::vTaskDelay(10);
        }
    }
}

fn now_ms() -> u32 {
    // SAFETY: esp_timer_get_time has no preconditions.
    (unsafe { esp_idf_sys::esp_timer_get_time() } / 1000) as u32
}
