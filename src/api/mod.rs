//! Identity provider API module.
//!
//! This module provides the `AuthProvider` trait describing the five
//! provider operations (obtain, register, refresh, introspect, revoke)
//! and the `AuthClient` HTTP implementation.
//!
//! The provider uses JWT bearer token authentication; tokens are obtained
//! through the form-encoded `/auth/token` endpoint.

pub mod client;
pub mod error;

pub use client::{AuthClient, AuthProvider, Introspection, TokenBundle};
pub use error::AuthError;
