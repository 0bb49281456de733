//! OpenID Connect relying-party token validation: discovery, JWKS refresh,
//! JWT verification against a single issuer, and a C ABI for foreign
//! callers.
//!
//! Native Rust callers construct an [`oidc::Provider`] directly. Foreign
//! callers (C and anything that can link a C ABI) go through the flat
//! function table in [`ffi`], which drives a process-wide singleton
//! `Provider` instead.

pub mod config;
pub mod ffi;
pub mod logging;
pub mod oidc;

pub use oidc::{ErrStatus, Provider};
