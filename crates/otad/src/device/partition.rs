//! A/B partition device
//!
//! The active partition is the one the kernel mounted as root (`root=` on
//! the kernel command line). `boot_part` in the bootloader environment only
//! names the next boot target, so it stops matching the running system as
//! soon as an update is enabled. Updates always go to the partition that is
//! not mounted, and only one update may be pending at a time.

use super::{BootEnvironment, Device, BOOTCOUNT_VAR, BOOT_PART_VAR, UPGRADE_AVAILABLE_VAR};
use crate::client::UpdatePayload;
use async_trait::async_trait;
use ota_common::OtaError;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{info, warn};

/// Kernel command line of the running system
pub const KERNEL_CMDLINE_PATH: &str = "/proc/cmdline";

/// Root device named by `root=` on a kernel command line
pub fn root_device(cmdline: &str) -> Option<&str> {
    cmdline
        .split_whitespace()
        .filter_map(|arg| arg.strip_prefix("root="))
        .last()
        .filter(|root| !root.is_empty())
}

/// Trailing partition number of a device path (`/dev/mmcblk0p3` -> `3`)
pub fn partition_number(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let digits: String = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

pub struct PartitionDevice<E> {
    env: E,
    rootfs_a: PathBuf,
    rootfs_b: PathBuf,
    cmdline: PathBuf,
}

impl<E: BootEnvironment> PartitionDevice<E> {
    /// Both partitions need distinct trailing partition numbers.
    pub fn new(
        env: E,
        rootfs_a: impl Into<PathBuf>,
        rootfs_b: impl Into<PathBuf>,
    ) -> Result<Self, OtaError> {
        let rootfs_a = rootfs_a.into();
        let rootfs_b = rootfs_b.into();

        let (num_a, num_b) = match (partition_number(&rootfs_a), partition_number(&rootfs_b)) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(OtaError::Config(format!(
                    "rootfs partitions {} and {} must end in a partition number",
                    rootfs_a.display(),
                    rootfs_b.display()
                )))
            }
        };
        if num_a == num_b {
            return Err(OtaError::Config(format!(
                "rootfs partitions {} and {} share partition number {}",
                rootfs_a.display(),
                rootfs_b.display(),
                num_a
            )));
        }

        Ok(Self {
            env,
            rootfs_a,
            rootfs_b,
            cmdline: PathBuf::from(KERNEL_CMDLINE_PATH),
        })
    }

    /// Read the kernel command line from `path` instead of `/proc/cmdline`
    pub fn with_cmdline(mut self, path: impl Into<PathBuf>) -> Self {
        self.cmdline = path.into();
        self
    }

    pub fn boot_env(&self) -> &E {
        &self.env
    }

    /// Partition the device is currently running from
    pub async fn active_partition(&self) -> Result<&Path, OtaError> {
        let cmdline = tokio::fs::read_to_string(&self.cmdline).await.map_err(|e| {
            OtaError::Device(format!("failed to read {}: {}", self.cmdline.display(), e))
        })?;
        let root = root_device(&cmdline).map(Path::new).ok_or_else(|| {
            OtaError::Device(format!("no root= in {}", self.cmdline.display()))
        })?;

        let parts = [&self.rootfs_a, &self.rootfs_b];
        parts
            .into_iter()
            .find(|part| part.as_path() == root)
            .or_else(|| {
                let number = partition_number(root)?;
                parts
                    .into_iter()
                    .find(|part| partition_number(part).as_deref() == Some(number.as_str()))
            })
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                OtaError::Device(format!(
                    "root device {} matches neither {} nor {}",
                    root.display(),
                    self.rootfs_a.display(),
                    self.rootfs_b.display()
                ))
            })
    }

    /// True while an enabled update has not been committed yet
    pub async fn update_pending(&self) -> Result<bool, OtaError> {
        let vars = self.env.read_vars(&[UPGRADE_AVAILABLE_VAR]).await?;
        Ok(vars.get(UPGRADE_AVAILABLE_VAR).map(String::as_str) == Some("1"))
    }

    /// Partition the next update goes to
    pub async fn inactive_partition(&self) -> Result<&Path, OtaError> {
        let active = self.active_partition().await?;
        if active == self.rootfs_a.as_path() {
            Ok(self.rootfs_b.as_path())
        } else {
            Ok(self.rootfs_a.as_path())
        }
    }
}

#[async_trait]
impl<E: BootEnvironment> Device for PartitionDevice<E> {
    async fn install_update(&self, payload: UpdatePayload) -> Result<(), OtaError> {
        // the inactive partition may already hold the next boot target
        if self.update_pending().await? {
            return Err(OtaError::UpdatePending);
        }

        let target = self.inactive_partition().await?;
        let size = payload.size();
        info!(partition = %target.display(), size, "Installing update");

        let mut reader = payload.into_reader().take(size);
        let mut partition = OpenOptions::new()
            .write(true)
            .open(target)
            .await
            .map_err(|e| {
                OtaError::Device(format!("failed to open {}: {}", target.display(), e))
            })?;

        let written = tokio::io::copy(&mut reader, &mut partition).await?;
        if written != size {
            return Err(OtaError::Device(format!(
                "short write to {}: {} of {} bytes",
                target.display(),
                written,
                size
            )));
        }

        partition.sync_all().await?;
        info!(partition = %target.display(), "Update written");
        Ok(())
    }

    async fn enable_updated_partition(&self) -> Result<(), OtaError> {
        let target = self.inactive_partition().await?;
        let number = partition_number(target).ok_or_else(|| {
            OtaError::Device(format!("{} has no partition number", target.display()))
        })?;

        self.env
            .write_vars(&[
                (UPGRADE_AVAILABLE_VAR, "1"),
                (BOOT_PART_VAR, number.as_str()),
                (BOOTCOUNT_VAR, "0"),
            ])
            .await?;

        info!(partition = %target.display(), "Next boot from updated partition");
        Ok(())
    }

    async fn commit_update(&self) -> Result<(), OtaError> {
        let vars = self
            .env
            .read_vars(&[UPGRADE_AVAILABLE_VAR, BOOT_PART_VAR])
            .await?;
        if vars.get(UPGRADE_AVAILABLE_VAR).map(String::as_str) != Some("1") {
            return Err(OtaError::NoUpdateInProgress);
        }

        let active = self.active_partition().await?;
        if partition_number(active).as_deref() != vars.get(BOOT_PART_VAR).map(String::as_str) {
            return Err(OtaError::Device(format!(
                "running from {}, not from the pending update",
                active.display()
            )));
        }

        self.env.write_vars(&[(UPGRADE_AVAILABLE_VAR, "0")]).await?;
        info!("Update committed");
        Ok(())
    }

    async fn reboot(&self) -> Result<(), OtaError> {
        warn!("Rebooting device");
        let status = Command::new("reboot")
            .status()
            .await
            .map_err(|e| OtaError::Device(format!("failed to run reboot: {}", e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(OtaError::Device(format!("reboot exited with {}", status)))
        }
    }
}
