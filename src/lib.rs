//! # SolderStation
//!
//! Calibration persistence and heater control for a soldering iron / hot air
//! gun station with interchangeable tips.
//!
//! ## Architecture
//!
//! Two execution contexts share state only through atomics:
//! - The sampling callback owns [`HeaterController`] and calls `power()` once
//!   per sample
//! - The main loop owns [`ConfigStore`], posts requests through
//!   [`HeaterState`] and reads the published filtered values
//! - Nothing on the sampling path locks, allocates or returns an error

#![cfg_attr(not(test), no_std)]

pub mod calibration;
pub mod config;
pub mod fault;
pub mod feedback;
pub mod heater;
pub mod log_globals;
pub mod logging;
pub mod storage;
pub mod timing;
pub mod tips;
pub mod uart_logger;
pub mod units;

pub use calibration::{build_calibration, calibration_ols, AutoCalibration, RecordOutcome};
pub use config::{Boost, ConfigRecord, ConfigStatus, ConfigStore, StationSetup};
pub use fault::{FaultCode, FaultSnapshot, FaultState};
pub use feedback::{Feedback, Silent};
pub use heater::{HeaterController, HeaterState, PidParams, PowerLaw, PowerMode};
pub use log_globals::{HEATER_LOG, MAIN_LOG};
pub use storage::{ChunkRead, StorageBackend, StorageError};
pub use tips::{Device, TipCalibrationContext, TipMask, TipRegistry};
