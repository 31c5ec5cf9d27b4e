//! Error types for mender-agent

pub use mender_error::{Error, ErrorKind, ErrorStatus, Result};
