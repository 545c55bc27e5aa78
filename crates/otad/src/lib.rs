//! otad library - exposes modules for testing.

pub mod cli;
pub mod client;
pub mod daemon;
pub mod device;
pub mod orchestrator;

pub use client::{FakeUpdateClient, HttpUpdateClient, UpdateClient, UpdatePayload};
pub use daemon::{Daemon, DaemonHandle, DaemonRunState};
pub use device::{BootEnvironment, Device, FakeDevice, MemoryBootEnv, PartitionDevice, UBootEnv};
pub use orchestrator::{perform_update, UpdateOutcome};
