//! Import E2E test suite.
//!
//! Drives the HTTP API end-to-end against the in-memory object store and
//! upload repository, with fault-injecting wrappers for failure paths.
//! No external services are needed.
//!
//! Run with: cargo test --test import_e2e

mod test_helpers;

mod test_concurrency;
mod test_failures;
mod test_history;
mod test_session_errors;
mod test_session_flow;
