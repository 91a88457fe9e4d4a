//! Configuration file support for rootloader.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (ROOTLOADER_*)
//! 3. Local config file (./rootloader.toml)
//! 4. Global config file (~/.config/rootloader/config.toml)
//!
//! ```toml
//! [connection]
//! serial = "/dev/ttyUSB0"
//! baud = 115200
//!
//! [bootloader]
//! key = "BOOTLOADER"
//! trigger = "(c) 2009 HR"
//! block_mode = false
//!
//! [target]
//! part = "atmega328p"
//! ```

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-project config file.
pub const LOCAL_CONFIG: &str = "rootloader.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Bootloader handshake settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootloaderConfig {
    /// Identification key compiled into the bootloader.
    pub key: Option<String>,
    /// Sign-on string the bootloader answers with.
    pub trigger: Option<String>,
    /// Ask for block mode transfers.
    #[serde(default)]
    pub block_mode: bool,
}

/// Target device configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Default part name.
    pub part: Option<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Serial connection.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Bootloader identification.
    #[serde(default)]
    pub bootloader: BootloaderConfig,
    /// Target part.
    #[serde(default)]
    pub target: TargetConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        Self::load_layered(Self::global_config_path().as_deref(), Path::new(LOCAL_CONFIG))
    }

    /// Load the global file, then let the local file override it.
    fn load_layered(global: Option<&Path>, local: &Path) -> Self {
        let mut config = Self::default();

        if let Some(global_path) = global {
            if let Some(global_config) = Self::load_from_file(global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_from_file(local) {
            debug!("Loaded local config from {}", local.display());
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "rootloader").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }

        if other.bootloader.key.is_some() {
            self.bootloader.key = other.bootloader.key;
        }
        if other.bootloader.trigger.is_some() {
            self.bootloader.trigger = other.bootloader.trigger;
        }
        if other.bootloader.block_mode {
            self.bootloader.block_mode = true;
        }

        if other.target.part.is_some() {
            self.target.part = other.target.part;
        }
    }
}
