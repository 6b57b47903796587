use quick_xml::de::from_str;
use serde::Deserialize;

use crate::types::{DocumentKind, ProtocolError, Result};

/// Protocol version negotiation document served at `/?comp=versions`.
#[derive(Debug, Deserialize, Clone)]
pub struct VersionInfo {
    #[serde(rename = "Preferred")]
    preferred: Preferred,
    #[serde(rename = "Supported", default)]
    supported: Supported,
}

#[derive(Debug, Deserialize, Clone)]
struct Preferred {
    #[serde(rename = "Version")]
    version: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
struct Supported {
    #[serde(rename = "Version", default)]
    version: Vec<String>,
}

impl VersionInfo {
    pub fn parse(xml: &str) -> Result<Self> {
        from_str(xml).map_err(|e| ProtocolError::MalformedDocument {
            kind: DocumentKind::Versions,
            reason: e.to_string(),
        })
    }

    pub fn preferred(&self) -> &str {
        &self.preferred.version
    }

    pub fn supports(&self, version: &str) -> bool {
        self.preferred.version == version || self.supported.version.iter().any(|v| v == version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<Versions>
  <Preferred>
    <Version>2015-04-05</Version>
  </Preferred>
  <Supported>
    <Version>2015-04-05</Version>
    <Version>2012-11-30</Version>
    <Version>2011-12-31</Version>
  </Supported>
</Versions>"#;

    #[test]
    fn reads_preferred_and_supported() {
        let info = VersionInfo::parse(SAMPLE).unwrap();
        assert_eq!(info.preferred(), "2015-04-05");
        assert!(info.supports("2012-11-30"));
        assert!(info.supports("2015-04-05"));
        assert!(!info.supports("2009-01-01"));
    }

    #[test]
    fn preferred_alone_counts_as_supported() {
        let xml = r#"<Versions>
  <Preferred>
    <Version>2012-11-30</Version>
  </Preferred>
</Versions>"#;
        let info = VersionInfo::parse(xml).unwrap();
        assert!(info.supports("2012-11-30"));
    }
}
