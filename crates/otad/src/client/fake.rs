//! Fake update client for deterministic testing

use super::{ResponseDecoder, UpdateClient, UpdatePayload};
use async_trait::async_trait;
use ota_common::{ImageInfo, OtaError, UpdateDescriptor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Fake update client with pre-configured answers.
///
/// ## Example
///
/// ```rust,ignore
/// let client = FakeUpdateClient::new()
///     .with_update(FakeUpdateClient::descriptor("https://srv/image"))
///     .failing_fetch("connection reset");
/// ```
#[derive(Debug, Default)]
pub struct FakeUpdateClient {
    scheduled: Option<UpdateDescriptor>,
    check_error: Option<String>,
    fetch_error: Option<String>,
    payload: Vec<u8>,
    check_calls: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl FakeUpdateClient {
    /// Client whose server never has anything scheduled
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor pointing at `uri`
    pub fn descriptor(uri: &str) -> UpdateDescriptor {
        UpdateDescriptor {
            id: "fake-deployment".to_string(),
            image: ImageInfo {
                uri: uri.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn with_update(mut self, descriptor: UpdateDescriptor) -> Self {
        self.scheduled = Some(descriptor);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn failing_check(mut self, message: &str) -> Self {
        self.check_error = Some(message.to_string());
        self
    }

    pub fn failing_fetch(mut self, message: &str) -> Self {
        self.fetch_error = Some(message.to_string());
        self
    }

    /// Number of schedule checks made
    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    /// Locations passed to `fetch_update`, in call order
    pub fn fetched_locations(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateClient for FakeUpdateClient {
    async fn check_for_update(
        &self,
        _decode: ResponseDecoder,
        _server_url: &str,
    ) -> Result<Option<UpdateDescriptor>, OtaError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);

        match &self.check_error {
            Some(message) => Err(OtaError::Transport(message.clone())),
            None => Ok(self.scheduled.clone()),
        }
    }

    async fn fetch_update(&self, location: &str) -> Result<UpdatePayload, OtaError> {
        self.fetched.lock().unwrap().push(location.to_string());

        match &self.fetch_error {
            Some(message) => Err(OtaError::Transport(message.clone())),
            None => Ok(UpdatePayload::from_bytes(self.payload.clone())),
        }
    }
}
