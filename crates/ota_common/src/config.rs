//! Daemon configuration
//!
//! Two independent lookups feed the daemon:
//! - `load_config` reads the TOML config file (poll interval, server, device id,
//!   rootfs partitions) and falls back to compiled-in defaults for anything
//!   missing or invalid.
//! - `resolve_server_address` reads a plain-text file holding one server
//!   address.
//!
//! Neither lookup ever fails outwardly. Which one wins is up to the caller.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Default poll interval between update checks (30 minutes)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Default update server address
pub const DEFAULT_SERVER_ADDRESS: &str = "https://ota.example.com";

/// Default device identity
pub const DEFAULT_DEVICE_ID: &str = "default-device";

/// Default rootfs partition A
pub const DEFAULT_ROOTFS_PART_A: &str = "/dev/mmcblk0p2";

/// Default rootfs partition B
pub const DEFAULT_ROOTFS_PART_B: &str = "/dev/mmcblk0p3";

/// Resolved daemon configuration. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Time between two schedule checks
    pub poll_interval: Duration,
    /// Update server base address
    pub server: String,
    /// Device identity, attached to every poll cycle log span
    pub device_id: String,
    /// Root filesystem partition A
    pub rootfs_part_a: String,
    /// Root filesystem partition B
    pub rootfs_part_b: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            server: DEFAULT_SERVER_ADDRESS.to_string(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            rootfs_part_a: DEFAULT_ROOTFS_PART_A.to_string(),
            rootfs_part_b: DEFAULT_ROOTFS_PART_B.to_string(),
        }
    }
}

/// On-disk shape of the config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    /// Poll interval in seconds
    #[serde(rename = "serverpollInterval")]
    server_poll_interval: Option<u64>,

    server: Option<String>,

    #[serde(rename = "deviceID")]
    device_id: Option<String>,

    #[serde(rename = "rootfsPartA")]
    rootfs_part_a: Option<String>,

    #[serde(rename = "rootfsPartB")]
    rootfs_part_b: Option<String>,
}

impl ConfigFile {
    /// Merge file values over the compiled-in defaults.
    fn resolve(self) -> DaemonConfig {
        let defaults = DaemonConfig::default();

        let poll_interval = match self.server_poll_interval {
            Some(0) => {
                warn!("serverpollInterval must be positive, using default");
                defaults.poll_interval
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.poll_interval,
        };

        DaemonConfig {
            poll_interval,
            server: non_empty(self.server).unwrap_or(defaults.server),
            device_id: non_empty(self.device_id).unwrap_or(defaults.device_id),
            rootfs_part_a: non_empty(self.rootfs_part_a).unwrap_or(defaults.rootfs_part_a),
            rootfs_part_b: non_empty(self.rootfs_part_b).unwrap_or(defaults.rootfs_part_b),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Load the daemon config from `path`.
///
/// A missing or unparseable file yields `DaemonConfig::default()`.
pub fn load_config(path: impl AsRef<Path>) -> DaemonConfig {
    let path = path.as_ref();

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Config {} not readable ({}), using defaults", path.display(), e);
            return DaemonConfig::default();
        }
    };

    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            debug!("Loaded config from {}", path.display());
            file.resolve()
        }
        Err(e) => {
            warn!("Config {} is invalid, using defaults: {}", path.display(), e);
            DaemonConfig::default()
        }
    }
}

/// Read the server address from a plain-text file.
///
/// Returns the trimmed file contents, or `DEFAULT_SERVER_ADDRESS` when the
/// file is missing, unreadable or empty. The address is not validated.
pub fn resolve_server_address(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();

    match fs::read_to_string(path) {
        Ok(content) => {
            let server = content.trim();
            if server.is_empty() {
                warn!("Server file {} is empty, using default", path.display());
                DEFAULT_SERVER_ADDRESS.to_string()
            } else {
                server.to_string()
            }
        }
        Err(e) => {
            debug!("Server file {} not readable ({}), using default", path.display(), e);
            DEFAULT_SERVER_ADDRESS.to_string()
        }
    }
}
