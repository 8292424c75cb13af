use std::path::Path;

use serde::{Deserialize, Serialize};

use nvtree_types::{BackendKind, ChecksumScheme, FormatVersion, KeyClass};

use crate::error::{SessionError, SessionResult};

/// Where on each kind of device the image starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseOffsets {
    pub nor: u32,
    pub serial_flash: u32,
    pub ram: u32,
}

impl BaseOffsets {
    pub fn get(&self, kind: BackendKind) -> u32 {
        match kind {
            BackendKind::Nor => self.nor,
            BackendKind::SerialFlash => self.serial_flash,
            BackendKind::Ram => self.ram,
        }
    }

    pub fn set(&mut self, kind: BackendKind, base: u32) {
        match kind {
            BackendKind::Nor => self.nor = base,
            BackendKind::SerialFlash => self.serial_flash = base,
            BackendKind::Ram => self.ram = base,
        }
    }
}

impl Default for BaseOffsets {
    fn default() -> Self {
        Self {
            nor: 0x30_0000,
            serial_flash: 0x0F_2000,
            ram: 0,
        }
    }
}

/// Session configuration, usually read from a TOML file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Bytes in the pool buffer: header plus payload.
    pub pool_size: u32,
    /// Entry layout written on save.
    pub format: FormatVersion,
    pub checksum: ChecksumScheme,
    pub bases: BaseOffsets,
    /// Power-up attempts before a serial device is declared unavailable.
    pub wakeup_retries: u32,
    /// Bytes erased and programmed per commit step, rounded up to whole
    /// erase sectors of the device.
    pub commit_chunk: u32,
    /// Encrypt images under this key class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secure: Option<KeyClass>,
    /// Hex-encoded 32-byte device secret for the asset cipher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_secret: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pool_size: 4096,
            format: FormatVersion::default(),
            checksum: ChecksumScheme::default(),
            bases: BaseOffsets::default(),
            wakeup_retries: 100,
            commit_chunk: 4096,
            secure: None,
            device_secret: None,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> SessionResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> SessionResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml(&self) -> SessionResult<String> {
        toml::to_string_pretty(self).map_err(|e| SessionError::Config(e.to_string()))
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.pool_size < 64 {
            return Err(SessionError::Config(format!(
                "pool_size {} is below the 64-byte minimum",
                self.pool_size
            )));
        }
        if self.commit_chunk == 0 || self.commit_chunk % 16 != 0 {
            return Err(SessionError::Config(format!(
                "commit_chunk {} must be a non-zero multiple of 16",
                self.commit_chunk
            )));
        }
        if self.wakeup_retries == 0 {
            return Err(SessionError::Config("wakeup_retries must be at least 1".into()));
        }
        Ok(())
    }
}
