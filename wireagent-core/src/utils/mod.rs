pub mod fileutils;
pub mod timestamps;

// Re-export commonly used items
pub use fileutils::{FsHandlerArtifacts, HandlerArtifacts};
pub use timestamps::{rfc3339_timestamp, wire_timestamp};
