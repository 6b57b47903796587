use quick_xml::de::from_str;
use serde::Deserialize;

use crate::types::{DocumentKind, ProtocolError, Result};

/// Hosting environment document: static descriptive attributes of the VM
/// for the current incarnation.
///
/// The VM name lives on the `Incarnation` element's `instance` attribute,
/// the role and deployment names on their own elements.
#[derive(Debug, Deserialize, Clone)]
pub struct HostingEnvironmentConfig {
    #[serde(rename = "Deployment")]
    deployment: Deployment,
    #[serde(rename = "Incarnation")]
    incarnation: Incarnation,
    #[serde(rename = "Role")]
    role: Role,
}

#[derive(Debug, Deserialize, Clone)]
struct Deployment {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize, Clone)]
struct Incarnation {
    #[serde(rename = "@instance")]
    instance: String,
}

#[derive(Debug, Deserialize, Clone)]
struct Role {
    #[serde(rename = "@name")]
    name: String,
}

impl HostingEnvironmentConfig {
    pub fn parse(xml: &str) -> Result<Self> {
        from_str(xml).map_err(|e| ProtocolError::MalformedDocument {
            kind: DocumentKind::HostingEnvironmentConfig,
            reason: e.to_string(),
        })
    }

    pub fn vm_name(&self) -> &str {
        &self.incarnation.instance
    }

    pub fn deployment_name(&self) -> &str {
        &self.deployment.name
    }

    pub fn role_name(&self) -> &str {
        &self.role.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<HostingEnvironmentConfig version="1.0.0.0" goalStateIncarnation="1">
  <StoredCertificates>
    <StoredCertificate name="Stored0PasswordEncryption" certificateId="sha1:C093FA5CD3AAE057CB7C4E04532B2E16E07C26CA" storeName="My" configurationLevel="System" />
  </StoredCertificates>
  <Deployment name="db00a7755a5e4e8a8fe4b19bc3b330c3" guid="{ce5a036f-5c93-40e7-8adf-2613631008ab}" incarnation="0">
    <Service name="MyVMName" guid="{00000000-0000-0000-0000-000000000000}" />
    <ServiceInstance name="db00a7755a5e4e8a8fe4b19bc3b330c3.1" guid="{d113f4d7-9ead-48c3-8c03-cd2e5d939a6a}" />
  </Deployment>
  <Incarnation number="1" instance="MachineRole_IN_0" guid="{a0faca35-52e5-4ec7-8fd1-63d2bc107d9b}" />
  <Role guid="{73d95f1c-6472-e58e-7a1a-523554e11d46}" name="MachineRole" settleTimeSeconds="10" />
</HostingEnvironmentConfig>"#;

    #[test]
    fn reads_names_from_attributes() {
        let doc = HostingEnvironmentConfig::parse(SAMPLE).unwrap();
        assert_eq!(doc.vm_name(), "MachineRole_IN_0");
        assert_eq!(doc.role_name(), "MachineRole");
        assert_eq!(doc.deployment_name(), "db00a7755a5e4e8a8fe4b19bc3b330c3");
    }

    #[test]
    fn missing_role_is_malformed() {
        let xml = r#"<HostingEnvironmentConfig>
  <Deployment name="dep" />
  <Incarnation instance="vm" />
</HostingEnvironmentConfig>"#;
        let err = HostingEnvironmentConfig::parse(xml).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MalformedDocument {
                kind: DocumentKind::HostingEnvironmentConfig,
                ..
            }
        ));
    }
}
