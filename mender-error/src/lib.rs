//! # mender-error
//!
//! Unified error handling for mender.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., BackendUnavailable, InstallFailed)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use mender_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::InstallFailed, "npm exited with status 1")
//!         .with_operation("installer::install")
//!         .with_context("module", "left-pad"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, mender_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using mender Error
pub type Result<T> = std::result::Result<T, Error>;
