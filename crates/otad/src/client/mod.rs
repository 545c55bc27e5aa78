//! Update Client Trait Abstraction
//!
//! The orchestrator only needs two things from the network: "is an update
//! scheduled for me?" and "give me the payload at this location". Production
//! code uses `HttpUpdateClient`; tests use `FakeUpdateClient`.

use async_trait::async_trait;
use ota_common::{OtaError, RawResponse, UpdateDescriptor};
use std::fmt;
use std::io::Cursor;
use tokio::io::AsyncRead;

mod fake;
mod http;

pub use fake::FakeUpdateClient;
pub use http::{ClientConfig, HttpUpdateClient, UPDATE_CHECK_PATH};

/// Turns a raw schedule-check response into a descriptor (`None` = nothing scheduled)
pub type ResponseDecoder = fn(RawResponse) -> Result<Option<UpdateDescriptor>, OtaError>;

/// Update payload: a byte stream plus its declared length.
///
/// Owned by whoever installs it; dropping it closes the underlying stream.
pub struct UpdatePayload {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    size: u64,
}

impl UpdatePayload {
    pub fn new(reader: impl AsyncRead + Send + Unpin + 'static, size: u64) -> Self {
        Self {
            reader: Box::new(reader),
            size,
        }
    }

    /// In-memory payload, size taken from the buffer
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        Self::new(Cursor::new(bytes), size)
    }

    /// Declared size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn into_reader(self) -> Box<dyn AsyncRead + Send + Unpin> {
        self.reader
    }
}

impl fmt::Debug for UpdatePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdatePayload")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Network side of an update cycle
#[async_trait]
pub trait UpdateClient: Send + Sync {
    /// Ask `server_url` whether an update is scheduled, decoding the reply with `decode`.
    ///
    /// Errors only on transport or protocol failure; "nothing scheduled" is `Ok(None)`.
    async fn check_for_update(
        &self,
        decode: ResponseDecoder,
        server_url: &str,
    ) -> Result<Option<UpdateDescriptor>, OtaError>;

    /// Download the payload found at `location`
    async fn fetch_update(&self, location: &str) -> Result<UpdatePayload, OtaError>;
}
