use quick_xml::de::from_str;
use serde::Deserialize;

use crate::types::{DocumentKind, ProtocolError, Result};

/// Certificates document: an encrypted, base64 wrapped bundle.
///
/// This type only carries the payload; decryption and thumbprint resolution
/// live in [`crate::crypto`].
#[derive(Debug, Deserialize, Clone)]
pub struct CertificatesConfig {
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "Incarnation", default)]
    pub incarnation: u32,
    #[serde(rename = "Format", default)]
    pub format: String,
    #[serde(rename = "Data", default)]
    pub data: String,
}

impl CertificatesConfig {
    pub fn parse(xml: &str) -> Result<Self> {
        from_str(xml).map_err(|e| ProtocolError::MalformedDocument {
            kind: DocumentKind::Certificates,
            reason: e.to_string(),
        })
    }

    /// The base64 payload with the whitespace the fabric wraps it in
    /// stripped out.
    pub fn data_compact(&self) -> String {
        self.data.chars().filter(|c| !c.is_whitespace()).collect()
    }
}
