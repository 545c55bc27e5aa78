//! Update daemon main loop
//!
//! Wakes every `poll_interval`, runs one update cycle, logs the outcome and
//! goes back to sleep. A failed cycle never ends the loop; only a stop
//! request does.
//!
//! Stop requests are observed between cycles. A cycle that is already
//! installing is allowed to finish.

use crate::client::{ResponseDecoder, UpdateClient};
use crate::device::Device;
use crate::orchestrator::{perform_update, UpdateOutcome};
use ota_common::{decode_update_response, DaemonConfig, OtaError, UpdateResult, UpdateState};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

const STOPPED: u8 = 0;
const RUNNING: u8 = 1;

/// Lifecycle state of the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonRunState {
    Stopped,
    Running,
}

/// Update daemon
pub struct Daemon<C, D> {
    client: Arc<C>,
    device: Arc<D>,
    /// Read-only once constructed
    config: DaemonConfig,
    decode: ResponseDecoder,
    /// Where cycle results are persisted, if anywhere
    state_path: Option<PathBuf>,
    run_state: AtomicU8,
    cancel: CancellationToken,
}

impl<C, D> Daemon<C, D>
where
    C: UpdateClient + 'static,
    D: Device + 'static,
{
    pub fn new(client: Arc<C>, device: Arc<D>, config: DaemonConfig) -> Self {
        Self {
            client,
            device,
            config,
            decode: decode_update_response,
            state_path: None,
            run_state: AtomicU8::new(STOPPED),
            cancel: CancellationToken::new(),
        }
    }

    /// Persist each cycle's result to `path`
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn run_state(&self) -> DaemonRunState {
        match self.run_state.load(Ordering::SeqCst) {
            RUNNING => DaemonRunState::Running,
            _ => DaemonRunState::Stopped,
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the poll loop until a stop is requested.
    ///
    /// The first cycle starts immediately. If a stop was requested before
    /// this call, it returns without polling.
    pub async fn run(&self) -> Result<(), OtaError> {
        if self.cancel.is_cancelled() {
            info!("Stop already requested, poll loop not started");
            return Ok(());
        }

        if self
            .run_state
            .compare_exchange(STOPPED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(OtaError::AlreadyRunning);
        }

        info!(
            server = %self.config.server,
            interval_secs = self.config.poll_interval.as_secs_f64(),
            "Update daemon running"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Not raced against cancellation: an install must not be cut short.
            let _ = self.poll_once().await;
        }

        self.run_state.store(STOPPED, Ordering::SeqCst);
        info!("Update daemon stopped");
        Ok(())
    }

    /// Ask the loop to exit. Safe to call at any time, any number of times.
    pub fn stop_daemon(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stop requested");
        }
        self.cancel.cancel();
    }

    /// Spawn the poll loop on the runtime
    pub fn spawn(self: Arc<Self>) -> DaemonHandle {
        let cancel = self.cancel.clone();
        let task = tokio::spawn(async move { self.run().await });
        DaemonHandle { cancel, task }
    }

    /// Run a single update cycle, log its outcome and record it.
    pub async fn poll_once(&self) -> Result<UpdateOutcome, OtaError> {
        let span = info_span!("poll_cycle", device = %self.config.device_id);

        async {
            let result = perform_update(
                self.client.as_ref(),
                self.device.as_ref(),
                self.decode,
                &self.config.server,
            )
            .await;

            match &result {
                Ok(UpdateOutcome::NoUpdateAvailable) => debug!("Cycle done: no update"),
                Ok(UpdateOutcome::UpdateInstalled) => info!("Cycle done: update installed"),
                Ok(UpdateOutcome::UpdateFailed(e)) => {
                    error!("Cycle failed after touching the device: {}", e)
                }
                Err(e) if e.is_network() => warn!("Update check failed: {}", e),
                Err(e) => error!("Cycle failed: {}", e),
            }

            self.record(&result).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn record(&self, result: &Result<UpdateOutcome, OtaError>) {
        let Some(path) = self.state_path.clone() else {
            return;
        };

        let (update_result, error) = match result {
            Ok(UpdateOutcome::UpdateFailed(e)) => (UpdateResult::Failed, Some(e.to_string())),
            Ok(outcome) => (outcome.as_update_result(), None),
            Err(e) => (UpdateResult::CheckFailed, Some(e.to_string())),
        };

        let saved = tokio::task::spawn_blocking(move || {
            let mut state = UpdateState::load(&path);
            state.record(update_result, error);
            state.save(&path).map_err(|e| format!("{}: {}", path.display(), e))
        })
        .await;

        match saved {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to save state to {}", e),
            Err(e) => warn!("State writer task failed: {}", e),
        }
    }
}

/// Handle to a spawned poll loop
pub struct DaemonHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), OtaError>>,
}

impl DaemonHandle {
    /// Request a stop without waiting for it
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request a stop and wait until the loop has fully exited
    pub async fn stop(self) -> Result<(), OtaError> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| OtaError::Task(e.to_string()))?
    }
}
