//! Integration tests for the node coordination hub.
//!
//! Nodes are stood up as `mockito` servers and driven through the real
//! `HttpFetcher`, so every test here exercises the HTTP path end to end.
//!
//! - `fetcher_tests`: retry, auth and status mapping of the HTTP fetcher
//! - `router_tests`: first-valid-wins fan-out over live mock nodes
//! - `epoch_tests`: worker-status probing, status transitions and index refresh
//! - `distributor_tests`: public routes from selection through verification
//! - `runtime_tests`: builder validation and shutdown coordination
//! - `mock_infrastructure`: reusable node mocks and fixtures
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod fetcher_tests;

#[cfg(test)]
mod router_tests;

#[cfg(test)]
mod epoch_tests;

#[cfg(test)]
mod distributor_tests;

#[cfg(test)]
mod runtime_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
