//! Shared types and utilities for the otad update agent.
//!
//! Configuration resolution, the error taxonomy, the update descriptor wire
//! format and the persisted cycle record live here so the daemon and its
//! tests agree on one definition.

pub mod config;
pub mod error;
pub mod update_response;
pub mod update_state;

pub use config::{
    load_config, resolve_server_address, DaemonConfig, DEFAULT_DEVICE_ID, DEFAULT_POLL_INTERVAL,
    DEFAULT_ROOTFS_PART_A, DEFAULT_ROOTFS_PART_B, DEFAULT_SERVER_ADDRESS,
};
pub use error::{OtaError, Result};
pub use update_response::{decode_update_response, ImageInfo, RawResponse, UpdateDescriptor};
pub use update_state::{UpdateResult, UpdateState};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/otad/otad.toml";

/// Plain-text server override file
pub const SERVER_FILE_PATH: &str = "/etc/otad/otad.server";

/// State directory for otad
pub const STATE_DIR: &str = "/var/lib/otad";

/// Cycle state file path
pub const STATE_PATH: &str = "/var/lib/otad/state.json";
