//! Device Trait Abstraction
//!
//! Everything that mutates the device goes through `Device`:
//! - install a payload into the inactive partition
//! - flag that partition as the next boot target
//! - commit a booted update as permanent
//! - reboot
//!
//! `PartitionDevice` is the real A/B implementation, driving a bootloader
//! environment through `BootEnvironment`. `FakeDevice` is for tests.

use crate::client::UpdatePayload;
use async_trait::async_trait;
use ota_common::OtaError;

mod boot_env;
mod fake;
mod partition;

pub use boot_env::{parse_env_output, BootEnvironment, MemoryBootEnv, UBootEnv};
pub use fake::FakeDevice;
pub use partition::{partition_number, root_device, PartitionDevice, KERNEL_CMDLINE_PATH};

/// Bootloader variable naming the partition number to boot
pub const BOOT_PART_VAR: &str = "boot_part";

/// Bootloader variable set while an update awaits commit
pub const UPGRADE_AVAILABLE_VAR: &str = "upgrade_available";

/// Bootloader variable counting boot attempts of a pending update
pub const BOOTCOUNT_VAR: &str = "bootcount";

#[async_trait]
pub trait Device: Send + Sync {
    /// Write the payload into the inactive partition
    async fn install_update(&self, payload: UpdatePayload) -> Result<(), OtaError>;

    /// Make the inactive partition the next boot target
    async fn enable_updated_partition(&self) -> Result<(), OtaError>;

    /// Make the running update permanent (after a successful boot)
    async fn commit_update(&self) -> Result<(), OtaError>;

    /// Restart the device
    async fn reboot(&self) -> Result<(), OtaError>;
}
