//! HTTP surface of a plug server
//!
//! Routes the per-version JSON-RPC endpoint, the manifest and listings, and the
//! public health and discovery endpoints.

pub mod handlers;
