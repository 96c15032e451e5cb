//! # Broker Testing Utils
//!
//! Shared testing utilities for the broker workspace.
//!
//! ## Features
//!
//! - **Mock Stores**: In-memory `JobStore` and `MessageStore` with call counters
//!   and failure injection
//! - **Mock ESIS Service**: Scripted push/pull responses, recorded calls
//! - **Recording Executor**: Captures trigger fires from the scheduler engine
//! - **Test Data Builders**: Jobs, messages and pull results with sensible defaults
//! - **Helpers**: Sample headers, result documents and polling utilities
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! broker-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
