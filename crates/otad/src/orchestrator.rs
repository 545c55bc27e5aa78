//! Update Orchestration
//!
//! One poll cycle: schedule check -> fetch -> install -> enable.
//!
//! Invariants:
//! - Each stage runs only if the previous one succeeded
//! - Errors before the device is touched come back as `Err`
//! - Errors after the device is touched come back as `UpdateFailed`
//! - No retries, no rollback; commit and reboot are never part of a cycle

use crate::client::{ResponseDecoder, UpdateClient};
use crate::device::Device;
use ota_common::{OtaError, UpdateResult};
use tracing::{debug, info, warn};

/// Outcome of a cycle that got past the network stages
#[derive(Debug)]
pub enum UpdateOutcome {
    /// Server had nothing scheduled
    NoUpdateAvailable,
    /// Payload installed and the updated partition enabled for next boot
    UpdateInstalled,
    /// Install or enable failed; the device may hold a partial update
    UpdateFailed(OtaError),
}

impl UpdateOutcome {
    /// Whether this cycle mutated (or tried to mutate) device state
    pub fn device_touched(&self) -> bool {
        !matches!(self, UpdateOutcome::NoUpdateAvailable)
    }

    /// Result to persist in the cycle state file
    pub fn as_update_result(&self) -> UpdateResult {
        match self {
            UpdateOutcome::NoUpdateAvailable => UpdateResult::NoUpdate,
            UpdateOutcome::UpdateInstalled => UpdateResult::Installed,
            UpdateOutcome::UpdateFailed(_) => UpdateResult::Failed,
        }
    }

    /// Flatten a cycle result into the `(updated, error)` pair
    pub fn into_parts(result: Result<UpdateOutcome, OtaError>) -> (bool, Option<OtaError>) {
        match result {
            Err(e) => (false, Some(e)),
            Ok(UpdateOutcome::NoUpdateAvailable) => (false, None),
            Ok(UpdateOutcome::UpdateInstalled) => (true, None),
            Ok(UpdateOutcome::UpdateFailed(e)) => (true, Some(e)),
        }
    }
}

/// Run one update cycle against `server_url`.
pub async fn perform_update<C, D>(
    client: &C,
    device: &D,
    decode: ResponseDecoder,
    server_url: &str,
) -> Result<UpdateOutcome, OtaError>
where
    C: UpdateClient + ?Sized,
    D: Device + ?Sized,
{
    let descriptor = match client.check_for_update(decode, server_url).await? {
        Some(descriptor) => descriptor,
        None => {
            debug!(server = %server_url, "No update scheduled");
            return Ok(UpdateOutcome::NoUpdateAvailable);
        }
    };

    info!(id = %descriptor.id, location = %descriptor.fetch_location(), "Update scheduled");

    let payload = client.fetch_update(descriptor.fetch_location()).await?;
    debug!(size = payload.size(), "Payload fetched");

    if let Err(e) = device.install_update(payload).await {
        warn!("Install failed: {}", e);
        return Ok(UpdateOutcome::UpdateFailed(e));
    }

    if let Err(e) = device.enable_updated_partition().await {
        warn!("Enabling updated partition failed: {}", e);
        return Ok(UpdateOutcome::UpdateFailed(e));
    }

    info!(id = %descriptor.id, "Update installed, reboot to activate");
    Ok(UpdateOutcome::UpdateInstalled)
}
