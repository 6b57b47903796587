//! Goal state synchronization and status reporting for the fabric wire
//! endpoint.
//!
//! The engine pulls the incarnation-versioned goal state and its
//! sub-documents (hosting environment, shared config, certificates,
//! extensions), caches them on disk keyed by incarnation, resolves
//! extension package versions against published manifests, and pushes
//! provisioning health, aggregate status and telemetry back to the fabric.
//!
//! Everything network-shaped goes through [`transport::Transport`];
//! [`wireserver::Protocol`] is the facade callers hold.

pub mod cache;
pub mod config;
pub mod crypto;
pub mod transport;
pub mod types;
pub mod utils;
pub mod wireserver;

pub use types::{Certificate, DocumentKind, ProtocolError, Result, VmInfo};
pub use wireserver::Protocol;
