//! Module: config
//!
//! Purpose: Persisted station configuration.
//!
//! Architecture:
//! - record.rs: 32-byte configuration record, flags, boost codec, checksum
//! - store.rs: `ConfigStore`, the record lifecycle plus tip calibration
//!   persistence through a `StorageBackend`
//! - nvs.rs: `StorageBackend` over ESP-IDF NVS (stub on the host)
//!
//! Safety: main-loop only. The sampling callback never touches storage.

pub mod nvs;
pub mod record;
pub mod store;

pub use nvs::{NvsError, NvsStorage, NVS_NAMESPACE};
pub use record::{Boost, ConfigFlags, ConfigRecord, MAX_OFF_TIMEOUT, MAX_SCR_SAVE_TIMEOUT};
pub use store::{ConfigStatus, ConfigStore, StationSetup, TipListItem};
