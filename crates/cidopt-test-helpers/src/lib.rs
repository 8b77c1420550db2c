//! Test utilities and fixtures for cidopt
//!
//! This crate provides shared test helpers that can be used by both
//! unit tests (#[cfg(test)]) and integration tests (tests/ directory).

pub mod compile;
pub mod fixtures;
pub mod mocks;
