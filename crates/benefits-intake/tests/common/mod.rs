//! Shared test utilities for benefits-intake integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a job to an in-memory database, a scratch
//!   directory and a recording upload transport
//! - Builders for claims and sample PDFs

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{RecordedUpload, RecordingTransport, TestHarness};
