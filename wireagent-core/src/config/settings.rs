use std::path::PathBuf;
use std::time::Duration;

use super::constants::{
    AGENT_NAME, AGENT_VERSION, DEFAULT_LIB_DIR, DEFAULT_WIRE_ENDPOINT, FETCH_RETRY_LIMIT,
    REPORT_RETRY_LIMIT, RETRY_DELAY_MS,
};

/// Static settings for one protocol engine instance.
///
/// The endpoint is a bare host; the engine builds every control-plane URL
/// as `http://{endpoint}/...`. Status blob URLs come from the goal state
/// and are used as-is.
#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    pub endpoint: String,
    /// Directory for cached documents, transport credentials and handler
    /// artifacts.
    pub lib_dir: PathBuf,
    pub agent_name: String,
    pub agent_version: String,
    pub fetch_retries: u32,
    pub report_retries: u32,
    pub retry_delay: Duration,
}

impl ProtocolSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        ProtocolSettings {
            endpoint: endpoint.into(),
            lib_dir: PathBuf::from(DEFAULT_LIB_DIR),
            agent_name: AGENT_NAME.to_string(),
            agent_version: AGENT_VERSION.to_string(),
            fetch_retries: FETCH_RETRY_LIMIT,
            report_retries: REPORT_RETRY_LIMIT,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }

    /// User-Agent header value for every wire request.
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.agent_name, self.agent_version)
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        ProtocolSettings::new(DEFAULT_WIRE_ENDPOINT)
    }
}
