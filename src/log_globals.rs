//! Global log stream instances, one producer context each.

use crate::logging::LogStream;

/// Written only by the sampling callback (heater control).
pub static HEATER_LOG: LogStream = LogStream::new("heater");

/// Written by the main loop (persistence, calibration, UI glue).
pub static MAIN_LOG: LogStream = LogStream::new("main");
