//! HTTP utilities and middleware.
//!
//! This module provides the security middleware applied around every route.

pub mod csrf;
pub mod security;

pub use csrf::{csrf_middleware, CsrfToken};
pub use security::{apply_header_controls, security_headers_middleware, SecurityHeaders};
