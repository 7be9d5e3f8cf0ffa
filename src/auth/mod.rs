//! Authentication for the remote campaign API
//!
//! This module provides the bearer token lifecycle:
//! - Basic-auth credential exchange
//! - Token caching with an expiry buffer
//! - Single-flight refresh and targeted invalidation on 401

pub mod token;

pub use token::{basic_auth_header, TokenProvider, AUTH_PATH};
