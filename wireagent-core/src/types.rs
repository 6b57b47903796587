use std::fmt;

use thiserror::Error;

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors surfaced by the protocol engine.
///
/// Transport-level retries happen inside the engine; by the time one of
/// these reaches the caller the retry budget for the operation is spent.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Network failure after the pull retry budget was exhausted.
    #[error("transport failure after {attempts} attempt(s): {reason}")]
    Transport { attempts: u32, reason: String },

    /// A fetched document did not parse or is missing required fields.
    /// Refetching the same incarnation returns the same bytes, so the
    /// entry is dropped from the cache before this is returned.
    #[error("{kind} document is malformed: {reason}")]
    MalformedDocument { kind: DocumentKind, reason: String },

    /// The cache held different content for a document the fabric says is
    /// immutable at this incarnation. The entry has been invalidated.
    #[error("cache held conflicting content for {kind} at incarnation {incarnation}")]
    CacheCorruption { kind: DocumentKind, incarnation: u32 },

    /// No published version of the extension satisfies the request.
    #[error("no published version of {extension} satisfies \"{requested}\"")]
    NoCompatibleVersion { extension: String, requested: String },

    /// The status blob endpoint rejected the SAS-signed URI. A goal state
    /// refresh is needed to obtain a fresh one; retrying the same URI
    /// cannot succeed.
    #[error("status upload rejected with HTTP {status}: signed uri is stale")]
    StaleSasUri { status: u16 },

    /// A push operation failed every attempt in its retry budget.
    #[error("report not acknowledged after {attempts} attempt(s)")]
    ReportFailed { attempts: u32 },

    /// The fabric does not advertise the wire protocol version we speak.
    #[error("wire protocol version {version} is not supported by the fabric")]
    VersionUnsupported { version: String },

    /// An operation that needs a goal state ran before the first refresh.
    #[error("goal state not synchronized; refresh first")]
    NotSynchronized,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Document kinds addressable in the on-disk cache.
///
/// Manifests are keyed per extension name; every other kind is a singleton
/// per incarnation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    GoalState,
    HostingEnvironmentConfig,
    SharedConfig,
    Certificates,
    ExtensionsConfig,
    Versions,
    Manifest(String),
}

impl DocumentKind {
    /// Cache file name for this document at the given incarnation.
    pub fn cache_file_name(&self, incarnation: u32) -> String {
        match self {
            DocumentKind::GoalState => format!("GoalState.{incarnation}.xml"),
            DocumentKind::HostingEnvironmentConfig => {
                format!("HostingEnvironmentConfig.{incarnation}.xml")
            }
            DocumentKind::SharedConfig => format!("SharedConfig.{incarnation}.xml"),
            DocumentKind::Certificates => format!("Certificates.{incarnation}.xml"),
            DocumentKind::ExtensionsConfig => format!("ExtensionsConfig.{incarnation}.xml"),
            DocumentKind::Versions => format!("Versions.{incarnation}.xml"),
            DocumentKind::Manifest(name) => format!("{name}.{incarnation}.manifest.xml"),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::GoalState => f.write_str("GoalState"),
            DocumentKind::HostingEnvironmentConfig => f.write_str("HostingEnvironmentConfig"),
            DocumentKind::SharedConfig => f.write_str("SharedConfig"),
            DocumentKind::Certificates => f.write_str("Certificates"),
            DocumentKind::ExtensionsConfig => f.write_str("ExtensionsConfig"),
            DocumentKind::Versions => f.write_str("Versions"),
            DocumentKind::Manifest(name) => write!(f, "Manifest({name})"),
        }
    }
}

/// Descriptive identity of the VM under the current goal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmInfo {
    pub vm_name: String,
    pub deployment_name: String,
    pub role_name: String,
    pub role_instance_id: String,
    pub container_id: String,
    pub incarnation: u32,
}

/// One trusted certificate decoded from the certificates bundle.
///
/// `private_key_pem` is populated when the bundle carried the matching key
/// immediately before the certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub thumbprint: String,
    pub cert_pem: String,
    pub private_key_pem: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_file_names_are_incarnation_keyed() {
        assert_eq!(
            DocumentKind::GoalState.cache_file_name(2),
            "GoalState.2.xml"
        );
        assert_eq!(
            DocumentKind::ExtensionsConfig.cache_file_name(7),
            "ExtensionsConfig.7.xml"
        );
        assert_eq!(
            DocumentKind::Manifest("ExampleHandlerLinux".to_string()).cache_file_name(3),
            "ExampleHandlerLinux.3.manifest.xml"
        );
    }

    #[test]
    fn errors_render_their_context() {
        let err = ProtocolError::NoCompatibleVersion {
            extension: "ExampleHandlerLinux".to_string(),
            requested: "2.0".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("ExampleHandlerLinux"));
        assert!(text.contains("2.0"));

        let err = ProtocolError::CacheCorruption {
            kind: DocumentKind::SharedConfig,
            incarnation: 4,
        };
        assert!(err.to_string().contains("SharedConfig"));
    }
}
