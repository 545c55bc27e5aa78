//! A/B Partition Device Tests
//!
//! Regular files stand in for the rootfs partitions, MemoryBootEnv for the
//! bootloader environment and a temp file for the kernel command line.

use ota_common::OtaError;
use otad::device::{BOOTCOUNT_VAR, BOOT_PART_VAR, UPGRADE_AVAILABLE_VAR};
use otad::{Device, MemoryBootEnv, PartitionDevice, UpdatePayload};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Partitions {
    _temp: TempDir,
    a: PathBuf,
    b: PathBuf,
    cmdline: PathBuf,
}

impl Partitions {
    /// Pretend the kernel mounted `root` as the root filesystem
    fn boot_into(&self, root: &Path) {
        let line = format!("console=ttyS0,115200 root={} rootwait ro\n", root.display());
        fs::write(&self.cmdline, line).unwrap();
    }
}

fn partitions() -> Partitions {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("mmcblk0p2");
    let b = temp.path().join("mmcblk0p3");
    let cmdline = temp.path().join("cmdline");
    fs::write(&a, vec![0u8; 64]).unwrap();
    fs::write(&b, vec![0u8; 64]).unwrap();
    Partitions {
        _temp: temp,
        a,
        b,
        cmdline,
    }
}

/// Device running from partition number `booted`
fn device(parts: &Partitions, booted: &str) -> PartitionDevice<MemoryBootEnv> {
    match booted {
        "2" => parts.boot_into(&parts.a),
        "3" => parts.boot_into(&parts.b),
        other => parts.boot_into(Path::new(&format!("/dev/mmcblk0p{}", other))),
    }
    PartitionDevice::new(MemoryBootEnv::booted_from(booted), &parts.a, &parts.b)
        .unwrap()
        .with_cmdline(&parts.cmdline)
}

// ============================================================================
// Partition selection
// ============================================================================

#[tokio::test]
async fn test_inactive_partition_is_the_other_one() {
    let parts = partitions();

    let dev = device(&parts, "2");
    assert_eq!(dev.active_partition().await.unwrap(), parts.a.as_path());
    assert_eq!(dev.inactive_partition().await.unwrap(), parts.b.as_path());

    let dev = device(&parts, "3");
    assert_eq!(dev.inactive_partition().await.unwrap(), parts.a.as_path());
}

#[tokio::test]
async fn test_unknown_root_partition_is_an_error() {
    let parts = partitions();
    let dev = device(&parts, "7");

    let err = dev.inactive_partition().await.unwrap_err();
    assert!(matches!(err, OtaError::Device(_)));
}

#[tokio::test]
async fn test_root_matched_by_partition_number() {
    let parts = partitions();
    let dev = device(&parts, "2");
    parts.boot_into(Path::new("/dev/mmcblk0p3"));

    assert_eq!(dev.active_partition().await.unwrap(), parts.b.as_path());
}

#[tokio::test]
async fn test_cmdline_without_root_is_an_error() {
    let parts = partitions();
    let dev = device(&parts, "2");
    fs::write(&parts.cmdline, "console=ttyS0 quiet\n").unwrap();

    let err = dev.active_partition().await.unwrap_err();
    assert!(matches!(err, OtaError::Device(_)));
}

#[tokio::test]
async fn test_enable_does_not_change_running_partition() {
    let parts = partitions();
    let dev = device(&parts, "2");

    dev.enable_updated_partition().await.unwrap();

    // next boot target moved, the mounted root did not
    assert_eq!(dev.boot_env().get(BOOT_PART_VAR).as_deref(), Some("3"));
    assert_eq!(dev.active_partition().await.unwrap(), parts.a.as_path());
    assert_eq!(dev.inactive_partition().await.unwrap(), parts.b.as_path());
}

#[test]
fn test_partitions_need_distinct_numbers() {
    let result = PartitionDevice::new(MemoryBootEnv::new(), "/dev/sda2", "/dev/sdb2");
    assert!(matches!(result, Err(OtaError::Config(_))));

    let result = PartitionDevice::new(MemoryBootEnv::new(), "/dev/root", "/dev/sdb2");
    assert!(matches!(result, Err(OtaError::Config(_))));
}

// ============================================================================
// Install / enable / commit
// ============================================================================

#[tokio::test]
async fn test_install_writes_inactive_partition_only() {
    let parts = partitions();
    let dev = device(&parts, "2");

    dev.install_update(UpdatePayload::from_bytes(b"new rootfs".to_vec()))
        .await
        .unwrap();

    let written = fs::read(&parts.b).unwrap();
    assert_eq!(&written[..10], b"new rootfs");
    assert_eq!(fs::read(&parts.a).unwrap(), vec![0u8; 64]);
}

#[tokio::test]
async fn test_second_install_before_reboot_leaves_running_partition_alone() {
    let parts = partitions();
    fs::write(&parts.a, b"RUNNING-ROOTFS-A").unwrap();
    let dev = device(&parts, "2");

    dev.install_update(UpdatePayload::from_bytes(b"update-image-1".to_vec()))
        .await
        .unwrap();
    dev.enable_updated_partition().await.unwrap();

    // next poll cycle, still running from A
    let err = dev
        .install_update(UpdatePayload::from_bytes(b"update-image-2".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, OtaError::UpdatePending));

    assert_eq!(fs::read(&parts.a).unwrap(), b"RUNNING-ROOTFS-A");
    assert_eq!(&fs::read(&parts.b).unwrap()[..14], b"update-image-1");
}

#[tokio::test]
async fn test_install_after_commit_targets_old_partition() {
    let parts = partitions();
    let dev = device(&parts, "2");

    dev.enable_updated_partition().await.unwrap();
    parts.boot_into(&parts.b);
    dev.commit_update().await.unwrap();

    dev.install_update(UpdatePayload::from_bytes(b"next rootfs".to_vec()))
        .await
        .unwrap();
    assert_eq!(&fs::read(&parts.a).unwrap()[..11], b"next rootfs");
    assert_eq!(fs::read(&parts.b).unwrap(), vec![0u8; 64]);
}

#[tokio::test]
async fn test_install_short_stream_is_an_error() {
    let parts = partitions();
    let dev = device(&parts, "2");

    // declares more bytes than the stream holds
    let payload = UpdatePayload::new(std::io::Cursor::new(b"abc".to_vec()), 10);
    let err = dev.install_update(payload).await.unwrap_err();
    assert!(matches!(err, OtaError::Device(_)));
}

#[tokio::test]
async fn test_enable_flags_inactive_partition_for_boot() {
    let parts = partitions();
    let dev = device(&parts, "2");

    dev.enable_updated_partition().await.unwrap();

    let env = dev.boot_env();
    assert_eq!(env.get(BOOT_PART_VAR).as_deref(), Some("3"));
    assert_eq!(env.get(UPGRADE_AVAILABLE_VAR).as_deref(), Some("1"));
    assert_eq!(env.get(BOOTCOUNT_VAR).as_deref(), Some("0"));
}

#[tokio::test]
async fn test_enable_fails_when_environment_is_read_only() {
    let parts = partitions();
    parts.boot_into(&parts.a);
    let env = MemoryBootEnv::booted_from("2").read_only();
    let dev = PartitionDevice::new(env, &parts.a, &parts.b)
        .unwrap()
        .with_cmdline(&parts.cmdline);

    let err = dev.enable_updated_partition().await.unwrap_err();
    assert!(matches!(err, OtaError::BootEnv(_)));
}

#[tokio::test]
async fn test_commit_after_reboot_into_update() {
    let parts = partitions();
    let dev = device(&parts, "2");
    dev.enable_updated_partition().await.unwrap();

    // the bootloader now boots partition 3; the agent commits it
    parts.boot_into(&parts.b);
    dev.commit_update().await.unwrap();
    assert_eq!(dev.boot_env().get(UPGRADE_AVAILABLE_VAR).as_deref(), Some("0"));
    assert_eq!(dev.active_partition().await.unwrap(), parts.b.as_path());
}

#[tokio::test]
async fn test_commit_before_reboot_is_an_error() {
    let parts = partitions();
    let dev = device(&parts, "2");
    dev.enable_updated_partition().await.unwrap();

    let err = dev.commit_update().await.unwrap_err();
    assert!(matches!(err, OtaError::Device(_)));
    assert_eq!(dev.boot_env().get(UPGRADE_AVAILABLE_VAR).as_deref(), Some("1"));
}

#[tokio::test]
async fn test_commit_without_pending_update_is_an_error() {
    let parts = partitions();
    let dev = device(&parts, "2");

    let err = dev.commit_update().await.unwrap_err();
    assert!(matches!(err, OtaError::NoUpdateInProgress));
}
