//! # mender client
//!
//! Turns a prompt into a stream of text fragments.
//!
//! ## Core Concepts
//! - **BackendConfig**: immutable description of one completion endpoint and its payload shape
//! - **Decoder**: splits the `data:`-framed wire format into records and extracts text
//! - **TokenStream**: ordered fragments with a terminal error, tagged with the backend that served it
//! - **StreamingClient**: primary backend first, one fallback to the secondary before streaming starts

pub mod backend;
pub mod client;
pub mod decode;
pub mod error;
pub mod stream;

pub use backend::{BackendConfig, BackendRole, PayloadShape};
pub use client::{CompletionSource, StreamingClient};
pub use decode::{extract_text, Decoded, RecordDecoder};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use stream::TokenStream;
