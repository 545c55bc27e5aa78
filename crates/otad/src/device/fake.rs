//! Fake device for deterministic testing

use super::Device;
use crate::client::UpdatePayload;
use async_trait::async_trait;
use ota_common::OtaError;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;

/// Device double that records calls and fails on demand
#[derive(Debug, Default)]
pub struct FakeDevice {
    install_error: Option<String>,
    enable_error: Option<String>,
    commit_error: Option<String>,
    reboot_error: Option<String>,
    calls: Mutex<Vec<&'static str>>,
    installed: Mutex<Vec<Vec<u8>>>,
}

impl FakeDevice {
    /// Device on which every operation succeeds
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_install(mut self, message: &str) -> Self {
        self.install_error = Some(message.to_string());
        self
    }

    pub fn failing_enable(mut self, message: &str) -> Self {
        self.enable_error = Some(message.to_string());
        self
    }

    pub fn failing_commit(mut self, message: &str) -> Self {
        self.commit_error = Some(message.to_string());
        self
    }

    pub fn failing_reboot(mut self, message: &str) -> Self {
        self.reboot_error = Some(message.to_string());
        self
    }

    /// Operations called so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Payloads received by successful installs
    pub fn installed(&self) -> Vec<Vec<u8>> {
        self.installed.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str, error: &Option<String>) -> Result<(), OtaError> {
        self.calls.lock().unwrap().push(call);
        match error {
            Some(message) => Err(OtaError::Device(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Device for FakeDevice {
    async fn install_update(&self, payload: UpdatePayload) -> Result<(), OtaError> {
        self.record("install", &self.install_error)?;

        let mut bytes = Vec::new();
        payload.into_reader().read_to_end(&mut bytes).await?;
        self.installed.lock().unwrap().push(bytes);
        Ok(())
    }

    async fn enable_updated_partition(&self) -> Result<(), OtaError> {
        self.record("enable", &self.enable_error)
    }

    async fn commit_update(&self) -> Result<(), OtaError> {
        self.record("commit", &self.commit_error)
    }

    async fn reboot(&self) -> Result<(), OtaError> {
        self.record("reboot", &self.reboot_error)
    }
}
