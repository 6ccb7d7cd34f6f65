//! Integration tests for spsync-graph
//!
//! Uses wiremock to simulate the Microsoft Graph API and verifies
//! end-to-end behavior of the GraphClient transport retry, library
//! resolution, column management, probes, uploads and metadata writes.

mod common;

mod test_library;
mod test_transport;
