//! Wire protocol documents and the protocol facade.
//!
//! One submodule per document kind, each owning its parse/serialize logic;
//! [`protocol::Protocol`] ties them together behind the engine's public
//! operations.

pub mod certificates;
pub mod extensions_config;
pub mod goal_state;
pub mod health;
pub mod hosting_env;
pub mod manifest;
pub mod protocol;
pub mod shared_config;
pub mod status;
pub mod telemetry;
pub mod version_info;

// Re-export commonly used types
pub use certificates::CertificatesConfig;
pub use extensions_config::{Extension, ExtensionInstance, ExtensionsConfig};
pub use goal_state::GoalState;
pub use health::Health;
pub use hosting_env::HostingEnvironmentConfig;
pub use manifest::{Manifest, ResolvedPackage};
pub use protocol::Protocol;
pub use shared_config::SharedConfig;
pub use status::{AggregateStatusDocument, FormattedMessage, HandlerAggregateStatus};
pub use telemetry::{Param, TelemetryData};
pub use version_info::VersionInfo;
