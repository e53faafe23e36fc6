//! Index service abstraction.
//!
//! This module provides an `IndexClient` trait for submitting documents and
//! querying batched upload/catalog status against an index backend.

mod http;
mod types;

pub use http::HttpIndexClient;
pub use types::*;
