use quick_xml::de::from_str;
use serde::Deserialize;

use crate::types::{DocumentKind, ProtocolError, Result};

/// Published version manifest for one extension.
#[derive(Debug, Clone)]
pub struct Manifest {
    extension: String,
    entries: Vec<PackageEntry>,
}

/// One published {version, package URIs} record.
#[derive(Debug, Deserialize, Clone)]
pub struct PackageEntry {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Uris", default)]
    pub uris: UriList,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct UriList {
    #[serde(rename = "Uri", default)]
    pub uri: Vec<String>,
}

/// Outcome of version resolution: the version to install and where to get
/// its package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub version: String,
    pub package_uri: String,
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(rename = "Plugins", default)]
    plugins: PluginList,
}

#[derive(Debug, Deserialize, Default)]
struct PluginList {
    #[serde(rename = "Plugin", default)]
    plugin: Vec<PackageEntry>,
}

impl Manifest {
    pub fn parse(xml: &str, extension: &str) -> Result<Self> {
        let doc: Document = from_str(xml).map_err(|e| ProtocolError::MalformedDocument {
            kind: DocumentKind::Manifest(extension.to_string()),
            reason: e.to_string(),
        })?;
        Ok(Manifest {
            extension: extension.to_string(),
            entries: doc.plugins.plugin,
        })
    }

    pub fn entries(&self) -> &[PackageEntry] {
        &self.entries
    }

    /// Picks the installable version for `requested`.
    ///
    /// An exact match always wins, even when a longer prefix match carries a
    /// higher number. Otherwise the request acts as a prefix constraint:
    /// among published versions whose leading dotted components equal the
    /// requested ones, the numerically highest is chosen ("1.10" beats
    /// "1.9"). No match is `NoCompatibleVersion`; there is no silent
    /// fallback to an arbitrary published version.
    pub fn resolve_version(&self, requested: &str) -> Result<ResolvedPackage> {
        if let Some(entry) = self.entries.iter().find(|e| e.version == requested) {
            return self.package_for(entry);
        }

        let no_match = || ProtocolError::NoCompatibleVersion {
            extension: self.extension.clone(),
            requested: requested.to_string(),
        };

        let want = components(requested).ok_or_else(no_match)?;
        let mut best: Option<(usize, Vec<u64>)> = None;
        for (idx, entry) in self.entries.iter().enumerate() {
            let Some(have) = components(&entry.version) else {
                continue;
            };
            if have.len() < want.len() || have[..want.len()] != want[..] {
                continue;
            }
            if best.as_ref().map_or(true, |(_, top)| have > *top) {
                best = Some((idx, have));
            }
        }

        match best {
            Some((idx, _)) => self.package_for(&self.entries[idx]),
            None => Err(no_match()),
        }
    }

    fn package_for(&self, entry: &PackageEntry) -> Result<ResolvedPackage> {
        let package_uri = entry.uris.uri.first().cloned().ok_or_else(|| {
            ProtocolError::MalformedDocument {
                kind: DocumentKind::Manifest(self.extension.clone()),
                reason: format!("published version {} has no package uri", entry.version),
            }
        })?;
        Ok(ResolvedPackage {
            version: entry.version.clone(),
            package_uri,
        })
    }
}

/// Dotted version split into numeric components; `None` when any component
/// is non-numeric.
fn components(version: &str) -> Option<Vec<u64>> {
    version
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}
