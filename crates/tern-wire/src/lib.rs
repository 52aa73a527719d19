//! tern-wire: stream records and the chat backend client
//!
//! This crate turns a raw response body into discrete records and talks to
//! the message and attachment endpoints.

pub mod client;
pub mod decoder;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{ChatClient, FileUpload};
pub use decoder::{Framing, NewlineDelimitedDecoder, ObjectAdjacencyDecoder, RecordDecoder};
pub use error::{Error, Result};
pub use stream::{ByteStream, RecordStream, decode_records};
pub use types::*;
