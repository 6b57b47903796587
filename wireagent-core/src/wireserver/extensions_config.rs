use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::warn;

use crate::types::{DocumentKind, ProtocolError, Result};

/// One extension requested by the fabric.
///
/// Definition attributes come from the `Plugins` list; per-instance
/// sequence numbers and handler settings come from `PluginSettings` and are
/// merged here by (name, version).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: String,
    /// Requested handler state as published (`enabled`, `disabled`, ...).
    pub state: String,
    /// Primary version-manifest URI.
    pub manifest_uri: String,
    /// Mirror tried when the primary manifest cannot be fetched.
    pub failover_manifest_uri: Option<String>,
    pub instances: Vec<ExtensionInstance>,
}

/// One configured instance of an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionInstance {
    pub requested_version: String,
    pub sequence_number: String,
    /// Handler settings JSON, passed to the handler runtime verbatim.
    pub settings: Option<String>,
}

/// Parsed extensions document: the requested extensions plus the SAS-signed
/// destination for agent status uploads.
#[derive(Debug, Clone, Default)]
pub struct ExtensionsConfig {
    pub extensions: Vec<Extension>,
    pub status_upload_blob: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(rename = "Plugins", default)]
    plugins: Plugins,
    #[serde(rename = "PluginSettings", default)]
    plugin_settings: PluginSettings,
    #[serde(rename = "StatusUploadBlob", default)]
    status_upload_blob: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct Plugins {
    #[serde(rename = "Plugin", default)]
    plugin: Vec<PluginDefinition>,
}

#[derive(Debug, Deserialize, Default)]
struct PluginSettings {
    #[serde(rename = "Plugin", default)]
    plugin: Vec<PluginRuntimeSettings>,
}

#[derive(Debug, Deserialize)]
struct PluginDefinition {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@version")]
    version: String,
    #[serde(rename = "@location", default)]
    location: String,
    #[serde(rename = "@failoverlocation", default)]
    failover_location: String,
    #[serde(rename = "@state", default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct PluginRuntimeSettings {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@version")]
    version: String,
    #[serde(rename = "RuntimeSettings")]
    runtime_settings: Option<RuntimeSettings>,
}

#[derive(Debug, Deserialize)]
struct RuntimeSettings {
    #[serde(rename = "@seqNo")]
    seq_no: String,
    #[serde(rename = "$value", default)]
    content: String,
}

impl ExtensionsConfig {
    pub fn parse(xml: &str) -> Result<Self> {
        let doc: Document = from_str(xml).map_err(|e| ProtocolError::MalformedDocument {
            kind: DocumentKind::ExtensionsConfig,
            reason: e.to_string(),
        })?;

        for settings in &doc.plugin_settings.plugin {
            let known = doc
                .plugins
                .plugin
                .iter()
                .any(|p| p.name == settings.name && p.version == settings.version);
            if !known {
                warn!(
                    extension = %settings.name,
                    version = %settings.version,
                    "runtime settings reference an extension the goal state does not request"
                );
            }
        }

        let extensions = doc
            .plugins
            .plugin
            .into_iter()
            .map(|plugin| {
                let mut instances: Vec<ExtensionInstance> = doc
                    .plugin_settings
                    .plugin
                    .iter()
                    .filter(|s| s.name == plugin.name && s.version == plugin.version)
                    .map(|s| match &s.runtime_settings {
                        Some(rt) => ExtensionInstance {
                            requested_version: s.version.clone(),
                            sequence_number: rt.seq_no.clone(),
                            settings: Some(rt.content.trim().to_string()),
                        },
                        None => ExtensionInstance {
                            requested_version: s.version.clone(),
                            sequence_number: "0".to_string(),
                            settings: None,
                        },
                    })
                    .collect();
                // A plugin without settings still gets one instance so the
                // handler can be installed and reported.
                if instances.is_empty() {
                    instances.push(ExtensionInstance {
                        requested_version: plugin.version.clone(),
                        sequence_number: "0".to_string(),
                        settings: None,
                    });
                }
                Extension {
                    name: plugin.name,
                    state: plugin.state,
                    manifest_uri: plugin.location,
                    failover_manifest_uri: if plugin.failover_location.is_empty() {
                        None
                    } else {
                        Some(plugin.failover_location)
                    },
                    instances,
                }
            })
            .collect();

        Ok(ExtensionsConfig {
            extensions,
            status_upload_blob: doc.status_upload_blob.filter(|uri| !uri.is_empty()),
        })
    }
}
