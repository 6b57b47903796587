//! Handler artifact access.
//!
//! The extension handler runtime writes status, heartbeat and state marker
//! files next to each installed handler. The status reporter reads them
//! through [`HandlerArtifacts`], which keeps the aggregation logic
//! independent of the on-disk layout.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::config::HEARTBEAT_STALE_SECS;

pub trait HandlerArtifacts: Send + Sync {
    /// Contents of the handler state marker (`Enabled`, `Disabled`, ...),
    /// if the handler is installed.
    fn handler_state(&self, name: &str, version: &str) -> Option<String>;

    /// Latest status artifact for one sequence number, verbatim.
    fn status(&self, name: &str, version: &str, seq_no: &str) -> Option<String>;

    /// Latest heartbeat artifact, verbatim.
    fn heartbeat(&self, name: &str, version: &str) -> Option<String>;

    /// Whether the handler runtime looks alive. A handler that never writes
    /// heartbeats counts as responsive; only a stale heartbeat marks it
    /// unresponsive.
    fn is_responsive(&self, name: &str, version: &str) -> bool;
}

/// Artifact layout used by the handler runtime under the lib directory:
///
/// ```text
/// {root}/{name}-{version}/config/HandlerState
/// {root}/{name}-{version}/status/{seq}.status
/// {root}/{name}-{version}/heartbeat.log
/// ```
pub struct FsHandlerArtifacts {
    root: PathBuf,
}

impl FsHandlerArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsHandlerArtifacts { root: root.into() }
    }

    fn handler_dir(&self, name: &str, version: &str) -> PathBuf {
        self.root.join(format!("{name}-{version}"))
    }
}

impl HandlerArtifacts for FsHandlerArtifacts {
    fn handler_state(&self, name: &str, version: &str) -> Option<String> {
        let path = self
            .handler_dir(name, version)
            .join("config")
            .join("HandlerState");
        fs::read_to_string(path).ok()
    }

    fn status(&self, name: &str, version: &str, seq_no: &str) -> Option<String> {
        let path = self
            .handler_dir(name, version)
            .join("status")
            .join(format!("{seq_no}.status"));
        fs::read_to_string(path).ok()
    }

    fn heartbeat(&self, name: &str, version: &str) -> Option<String> {
        let path = self.handler_dir(name, version).join("heartbeat.log");
        fs::read_to_string(path).ok()
    }

    fn is_responsive(&self, name: &str, version: &str) -> bool {
        let path = self.handler_dir(name, version).join("heartbeat.log");
        let Ok(metadata) = fs::metadata(&path) else {
            return true;
        };
        let Ok(modified) = metadata.modified() else {
            return true;
        };
        match SystemTime::now().duration_since(modified) {
            Ok(age) => age <= Duration::from_secs(HEARTBEAT_STALE_SECS),
            // Heartbeat from the future; clock moved, give it the benefit
            // of the doubt.
            Err(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_artifact(root: &std::path::Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn reads_artifacts_from_handler_layout() {
        let dir = tempdir().unwrap();
        write_artifact(
            dir.path(),
            "ExampleHandlerLinux-1.4.2/config/HandlerState",
            "Enabled\n",
        );
        write_artifact(
            dir.path(),
            "ExampleHandlerLinux-1.4.2/status/0.status",
            r#"{"status": "success"}"#,
        );
        write_artifact(
            dir.path(),
            "ExampleHandlerLinux-1.4.2/heartbeat.log",
            r#"[{"heartbeat": {"status": "ready"}}]"#,
        );

        let artifacts = FsHandlerArtifacts::new(dir.path());
        assert_eq!(
            artifacts
                .handler_state("ExampleHandlerLinux", "1.4.2")
                .unwrap()
                .trim(),
            "Enabled"
        );
        assert!(artifacts
            .status("ExampleHandlerLinux", "1.4.2", "0")
            .unwrap()
            .contains("success"));
        assert!(artifacts
            .heartbeat("ExampleHandlerLinux", "1.4.2")
            .unwrap()
            .contains("ready"));
        // Heartbeat was written just now.
        assert!(artifacts.is_responsive("ExampleHandlerLinux", "1.4.2"));
    }

    #[test]
    fn missing_artifacts_are_none_and_responsive() {
        let dir = tempdir().unwrap();
        let artifacts = FsHandlerArtifacts::new(dir.path());
        assert!(artifacts.handler_state("Nothing", "1.0").is_none());
        assert!(artifacts.status("Nothing", "1.0", "0").is_none());
        assert!(artifacts.heartbeat("Nothing", "1.0").is_none());
        assert!(artifacts.is_responsive("Nothing", "1.0"));
    }
}
