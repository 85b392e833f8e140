#![cfg_attr(not(test), deny(unsafe_code))]
#![warn(
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::missing_docs_in_private_items
)]

//! Shared HTTP and SSE plumbing for the claude-ox client
//!
//! This crate provides the request-construction and server-sent-events
//! decoding layers so the client crate stays focused on the message model
//! and the streaming state machine.

pub mod error;
pub mod request_builder;
pub mod streaming;

pub use error::CommonRequestError;
pub use request_builder::{AuthMethod, Endpoint, HttpMethod, RequestBuilder, RequestConfig};
pub use streaming::SseLineReader;

/// Re-export common types for convenience
pub use futures_util::stream::BoxStream;
pub use serde::{Deserialize, Serialize};
