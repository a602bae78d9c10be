//! NVS-backed storage for the configuration record and tip chunks.
//!
//! Every record is one NVS blob in namespace [`NVS_NAMESPACE`]:
//!
//! - `cfg`: the 32-byte configuration record
//! - `tip00` .. `tip31`: one 16-byte tip record per chunk
//!
//! NVS does its own wear levelling and has no read cache, so
//! `force_reload_next` has nothing to bypass. On the host the adapter is a
//! stub that reports the medium as unavailable.

use crate::storage::{StorageBackend, StorageError, CONFIG_RECORD_SIZE, TIP_RECORD_SIZE};

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::EspError;

/// NVS namespace for the station configuration.
pub const NVS_NAMESPACE: &str = "station_cfg";

/// Number of tip chunks kept in NVS.
pub const NVS_TIP_CHUNKS: u8 = 32;

/// NVS key of the configuration record.
#[cfg(target_os = "espidf")]
const CONFIG_KEY: &str = "cfg";

/// NVS operation errors.
#[derive(Debug)]
pub enum NvsError {
    /// NVS initialization failed
    #[cfg(target_os = "espidf")]
    InitFailed(EspError),
    /// NVS read/write error
    #[cfg(target_os = "espidf")]
    IoError(EspError),
    /// Feature not available on this platform
    #[cfg(not(target_os = "espidf"))]
    NotAvailable,
}

#[cfg(target_os = "espidf")]
impl From<EspError> for NvsError {
    fn from(e: EspError) -> Self {
        NvsError::IoError(e)
    }
}

impl From<NvsError> for StorageError {
    fn from(e: NvsError) -> Self {
        match e {
            #[cfg(target_os = "espidf")]
            NvsError::InitFailed(_) => StorageError::NotAvailable,
            #[cfg(target_os = "espidf")]
            NvsError::IoError(_) => StorageError::Io,
            #[cfg(not(target_os = "espidf"))]
            NvsError::NotAvailable => StorageError::NotAvailable,
        }
    }
}

/// Key of tip chunk `index`, e.g. `tip07`.
pub fn tip_key(index: u8) -> heapless::String<8> {
    use core::fmt::Write;
    let mut key = heapless::String::new();
    let _ = write!(key, "tip{:02}", index);
    key
}

/// Storage backend over the default NVS partition.
#[cfg(target_os = "espidf")]
pub struct NvsStorage {
    nvs: Option<EspNvs<NvsDefault>>,
}

#[cfg(target_os = "espidf")]
impl NvsStorage {
    /// Open [`NVS_NAMESPACE`] read-write.
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, NvsError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true).map_err(NvsError::InitFailed)?;
        Ok(Self { nvs: Some(nvs) })
    }

    /// A backend whose medium is missing; the station runs on defaults.
    pub fn unavailable() -> Self {
        Self { nvs: None }
    }

    fn nvs(&mut self) -> Result<&mut EspNvs<NvsDefault>, StorageError> {
        self.nvs.as_mut().ok_or(StorageError::NotAvailable)
    }

    /// Read blob `key` into `buf`; a missing key reads as erased (0xFF).
    fn read_blob(&mut self, key: &str, buf: &mut [u8]) -> Result<(), StorageError> {
        let found = self.nvs()?.get_blob(key, buf).map_err(NvsError::from)?.map(|data| data.len());
        match found {
            Some(len) if len == buf.len() => {}
            _ => buf.fill(0xFF),
        }
        Ok(())
    }

    fn write_blob(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.nvs()?.set_blob(key, data).map_err(NvsError::from)?;
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
impl StorageBackend for NvsStorage {
    fn init(&mut self) -> bool {
        // The namespace was opened read-write; check it answers.
        self.nvs().is_ok_and(|nvs| nvs.contains(CONFIG_KEY).is_ok())
    }

    fn chunk_count(&self) -> u8 {
        if self.nvs.is_some() {
            NVS_TIP_CHUNKS
        } else {
            0
        }
    }

    fn read_chunk(&mut self, index: u8, buf: &mut [u8; TIP_RECORD_SIZE]) -> Result<(), StorageError> {
        if index >= NVS_TIP_CHUNKS {
            return Err(StorageError::OutOfRange);
        }
        self.read_blob(&tip_key(index), buf)
    }

    fn write_chunk(&mut self, index: u8, buf: &[u8; TIP_RECORD_SIZE]) -> Result<(), StorageError> {
        if index >= NVS_TIP_CHUNKS {
            return Err(StorageError::OutOfRange);
        }
        self.write_blob(&tip_key(index), buf)
    }

    fn read_config(&mut self, buf: &mut [u8; CONFIG_RECORD_SIZE]) -> Result<(), StorageError> {
        self.read_blob(CONFIG_KEY, buf)
    }

    fn write_config(&mut self, buf: &[u8; CONFIG_RECORD_SIZE]) -> Result<(), StorageError> {
        self.write_blob(CONFIG_KEY, buf)
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        let nvs = self.nvs()?;
        nvs.remove(CONFIG_KEY).map_err(NvsError::from)?;
        for index in 0..NVS_TIP_CHUNKS {
            nvs.remove(&tip_key(index)).map_err(NvsError::from)?;
        }
        Ok(())
    }

    fn force_reload_next(&mut self) {}
}

/// Stub for non-ESP platforms
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct NvsStorage;

#[cfg(not(target_os = "espidf"))]
impl NvsStorage {
    pub fn new() -> Self {
        NvsStorage
    }
}

#[cfg(not(target_os = "espidf"))]
impl StorageBackend for NvsStorage {
    fn init(&mut self) -> bool {
        false
    }

    fn chunk_count(&self) -> u8 {
        0
    }

    fn read_chunk(&mut self, _index: u8, _buf: &mut [u8; TIP_RECORD_SIZE]) -> Result<(), StorageError> {
        Err(NvsError::NotAvailable.into())
    }

    fn write_chunk(&mut self, _index: u8, _buf: &[u8; TIP_RECORD_SIZE]) -> Result<(), StorageError> {
        Err(NvsError::NotAvailable.into())
    }

    fn read_config(&mut self, _buf: &mut [u8; CONFIG_RECORD_SIZE]) -> Result<(), StorageError> {
        Err(NvsError::NotAvailable.into())
    }

    fn write_config(&mut self, _buf: &[u8; CONFIG_RECORD_SIZE]) -> Result<(), StorageError> {
        Err(NvsError::NotAvailable.into())
    }

    fn erase(&mut self) -> Result<(), StorageError> {
        Err(NvsError::NotAvailable.into())
    }

    fn force_reload_next(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nvs_namespace_constant() {
        assert_eq!(NVS_NAMESPACE, "station_cfg");
        assert!(NVS_NAMESPACE.len() <= 15);
    }

    #[test]
    fn test_tip_keys() {
        assert_eq!(tip_key(0).as_str(), "tip00");
        assert_eq!(tip_key(31).as_str(), "tip31");
    }

    #[cfg(not(target_os = "espidf"))]
    #[test]
    fn test_host_stub_unavailable() {
        let mut nvs = NvsStorage::new();
        assert!(!nvs.init());
        let mut buf = [0u8; CONFIG_RECORD_SIZE];
        assert_eq!(nvs.read_config(&mut buf), Err(StorageError::NotAvailable));
    }
}
