//! Tenant context for API requests.
//!
//! The service trusts an upstream gateway to authenticate users; handlers
//! only need the organization to scope by and, optionally, who acted.

mod extractor;

pub use extractor::TenantContext;
