//! Update server wire format
//!
//! The schedule check answers either 204 (nothing scheduled) or 200 with a
//! JSON body naming the artifact to download.

use crate::error::{OtaError, Result};
use serde::{Deserialize, Serialize};

/// Raw schedule-check response handed from the transport to a decoder
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Artifact image reference
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageInfo {
    pub uri: String,
    #[serde(default)]
    pub checksum: String,
    #[serde(default)]
    pub yocto_id: String,
}

/// An update scheduled for this device
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateDescriptor {
    #[serde(default)]
    pub id: String,
    pub image: ImageInfo,
}

impl UpdateDescriptor {
    /// Where the payload for this update is fetched from
    pub fn fetch_location(&self) -> &str {
        &self.image.uri
    }
}

/// Decode a schedule-check response.
///
/// 204 means no update is scheduled; 200 must carry a descriptor. Anything
/// else is a protocol error.
pub fn decode_update_response(response: RawResponse) -> Result<Option<UpdateDescriptor>> {
    match response.status {
        204 => Ok(None),
        200 => {
            let descriptor: UpdateDescriptor = serde_json::from_slice(&response.body)
                .map_err(|e| OtaError::Protocol(format!("invalid update response: {}", e)))?;
            if descriptor.image.uri.is_empty() {
                return Err(OtaError::Protocol(
                    "update response has no image uri".to_string(),
                ));
            }
            Ok(Some(descriptor))
        }
        status => Err(OtaError::Protocol(format!(
            "unexpected status {} from update server",
            status
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPDATE_BODY: &str = r#"{
        "id": "13876-123132-321123",
        "image": {
            "uri": "https://ota.example.com/images/rootfs-2.img",
            "checksum": "cc436f982bc60a8255fe1926a450db5f195a19ad",
            "yocto_id": "core-image-full-cmdline-20160330201408"
        }
    }"#;

    #[test]
    fn test_no_content_means_no_update() {
        let decoded = decode_update_response(RawResponse::new(204, Vec::new())).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_ok_response_decodes_descriptor() {
        let decoded = decode_update_response(RawResponse::new(200, UPDATE_BODY))
            .unwrap()
            .expect("descriptor");
        assert_eq!(decoded.id, "13876-123132-321123");
        assert_eq!(
            decoded.fetch_location(),
            "https://ota.example.com/images/rootfs-2.img"
        );
    }

    #[test]
    fn test_ok_response_with_garbage_is_protocol_error() {
        let err = decode_update_response(RawResponse::new(200, "not json")).unwrap_err();
        assert!(matches!(err, OtaError::Protocol(_)));
    }

    #[test]
    fn test_missing_uri_is_protocol_error() {
        let body = r#"{"id": "1", "image": {"uri": ""}}"#;
        let err = decode_update_response(RawResponse::new(200, body)).unwrap_err();
        assert!(matches!(err, OtaError::Protocol(_)));
    }

    #[test]
    fn test_unexpected_status_is_protocol_error() {
        let err = decode_update_response(RawResponse::new(500, "boom")).unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
