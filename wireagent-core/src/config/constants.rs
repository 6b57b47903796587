// Wire protocol constants

/// Default fabric wire endpoint (host only, no scheme)
pub const DEFAULT_WIRE_ENDPOINT: &str = "168.63.129.16";

/// Wire protocol version spoken by this engine (goal state, certificates, health)
pub const WIRE_PROTOCOL_VERSION: &str = "2012-11-30";

/// Agent name sent in the x-ms-agent-name header
pub const AGENT_NAME: &str = "wireagent-rs";

/// Agent version string
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory holding cached wire documents and transport credentials
pub const DEFAULT_LIB_DIR: &str = "/var/lib/wireagent";

/// Attempts per pull (GET) operation before giving up
pub const FETCH_RETRY_LIMIT: u32 = 3;

/// Attempts per push (POST/PUT) operation before giving up
pub const REPORT_RETRY_LIMIT: u32 = 3;

/// Delay between retry attempts in milliseconds
pub const RETRY_DELAY_MS: u64 = 1_000;

/// Per-request transport timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Handler heartbeats older than this are treated as unresponsive (seconds)
pub const HEARTBEAT_STALE_SECS: u64 = 600;

/// Version of the aggregate status document uploaded to the status blob
pub const STATUS_DOCUMENT_VERSION: &str = "1.1";
