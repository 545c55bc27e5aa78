//! HTTPS update client
//!
//! Talks to the update server with an optional client certificate (mutual
//! TLS) and an optional private CA for the server.

use super::{ResponseDecoder, UpdateClient, UpdatePayload};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use ota_common::{OtaError, RawResponse, UpdateDescriptor};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::debug;

/// Schedule-check endpoint, relative to the server address
pub const UPDATE_CHECK_PATH: &str = "/api/devices/0.1/deployments/device/update";

const CHECK_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// TLS material for the client. All paths are optional.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Client certificate (PEM)
    pub client_cert: Option<PathBuf>,
    /// Client private key (PEM)
    pub client_key: Option<PathBuf>,
    /// CA certificate used to verify the server (PEM)
    pub server_ca: Option<PathBuf>,
}

pub struct HttpUpdateClient {
    http: reqwest::Client,
}

impl HttpUpdateClient {
    pub fn new(config: &ClientConfig) -> Result<Self, OtaError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .user_agent(format!("otad/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT);

        match (&config.client_cert, &config.client_key) {
            (Some(cert), Some(key)) => {
                let mut pem = std::fs::read(cert)?;
                pem.push(b'\n');
                pem.extend(std::fs::read(key)?);
                let identity = reqwest::Identity::from_pem(&pem)
                    .map_err(|e| OtaError::Config(format!("invalid client identity: {}", e)))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(OtaError::Config(
                    "client certificate and key must be given together".to_string(),
                ))
            }
        }

        if let Some(ca) = &config.server_ca {
            let pem = std::fs::read(ca)?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| OtaError::Config(format!("invalid server CA: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| OtaError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }
}

fn transport(e: reqwest::Error) -> OtaError {
    OtaError::Transport(e.to_string())
}

#[async_trait]
impl UpdateClient for HttpUpdateClient {
    async fn check_for_update(
        &self,
        decode: ResponseDecoder,
        server_url: &str,
    ) -> Result<Option<UpdateDescriptor>, OtaError> {
        let url = format!("{}{}", server_url.trim_end_matches('/'), UPDATE_CHECK_PATH);
        debug!(%url, "Asking server for scheduled update");

        let response = self
            .http
            .get(&url)
            .timeout(CHECK_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport)?;

        decode(RawResponse::new(status, body.to_vec()))
    }

    async fn fetch_update(&self, location: &str) -> Result<UpdatePayload, OtaError> {
        debug!(%location, "Fetching update payload");

        let response = self.http.get(location).send().await.map_err(transport)?;

        if !response.status().is_success() {
            return Err(OtaError::Transport(format!(
                "download of {} failed: {}",
                location,
                response.status()
            )));
        }

        let size = response.content_length().ok_or_else(|| {
            OtaError::Protocol(format!("download of {} has no content length", location))
        })?;

        let stream = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let reader = StreamReader::new(Box::pin(stream));

        Ok(UpdatePayload::new(reader, size))
    }
}
