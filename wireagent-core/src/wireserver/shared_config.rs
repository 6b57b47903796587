use quick_xml::de::from_str;
use serde::Deserialize;

use crate::types::{DocumentKind, ProtocolError, Result};

/// Shared config document: role topology common to every instance in the
/// deployment. Read-only reference data; nothing in the engine acts on it.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    pub deployment_name: String,
    pub role_name: String,
    pub instances: Vec<InstanceAddress>,
    raw: String,
}

/// Address record for one role instance in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceAddress {
    pub id: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(rename = "Deployment")]
    deployment: Deployment,
    #[serde(rename = "Role")]
    role: Role,
    #[serde(rename = "Instances", default)]
    instances: Option<Instances>,
}

#[derive(Debug, Deserialize)]
struct Deployment {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Role {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct Instances {
    #[serde(rename = "Instance", default)]
    instance: Vec<Instance>,
}

#[derive(Debug, Deserialize)]
struct Instance {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@address", default)]
    address: String,
}

impl SharedConfig {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc: Document = from_str(xml).map_err(|e| ProtocolError::MalformedDocument {
            kind: DocumentKind::SharedConfig,
            reason: e.to_string(),
        })?;
        let instances = doc
            .instances
            .map(|list| {
                list.instance
                    .into_iter()
                    .map(|i| InstanceAddress {
                        id: i.id,
                        address: i.address,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(SharedConfig {
            deployment_name: doc.deployment.name,
            role_name: doc.role.name,
            instances,
            raw: xml.to_string(),
        })
    }

    /// The document as served, for consumers that need fields the engine
    /// does not model.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<SharedConfig version="1.0.0.0" goalStateIncarnation="1">
  <Deployment name="db00a7755a5e4e8a8fe4b19bc3b330c3" guid="{ce5a036f-5c93-40e7-8adf-2613631008ab}" incarnation="0">
    <Service name="MyVMName" guid="{00000000-0000-0000-0000-000000000000}" />
    <ServiceInstance name="db00a7755a5e4e8a8fe4b19bc3b330c3.1" guid="{d113f4d7-9ead-48c3-8c03-cd2e5d939a6a}" />
  </Deployment>
  <Incarnation number="1" />
  <Role guid="{73d95f1c-6472-e58e-7a1a-523554e11d46}" name="MachineRole" settleTimeSeconds="10" />
  <Instances>
    <Instance id="MachineRole_IN_0" address="10.115.153.75">
      <FaultDomains randomId="0" updateId="0" updateCount="0" />
    </Instance>
    <Instance id="MachineRole_IN_1" address="10.115.153.76">
      <FaultDomains randomId="0" updateId="1" updateCount="0" />
    </Instance>
  </Instances>
</SharedConfig>"#;

    #[test]
    fn parses_topology() {
        let shared = SharedConfig::parse(SAMPLE).unwrap();
        assert_eq!(shared.deployment_name, "db00a7755a5e4e8a8fe4b19bc3b330c3");
        assert_eq!(shared.role_name, "MachineRole");
        assert_eq!(shared.instances.len(), 2);
        assert_eq!(shared.instances[0].id, "MachineRole_IN_0");
        assert_eq!(shared.instances[0].address, "10.115.153.75");
        assert!(shared.raw().contains("goalStateIncarnation"));
    }

    #[test]
    fn instances_are_optional() {
        let xml = r#"<SharedConfig>
  <Deployment name="dep" />
  <Role name="role" />
</SharedConfig>"#;
        let shared = SharedConfig::parse(xml).unwrap();
        assert!(shared.instances.is_empty());
    }
}
