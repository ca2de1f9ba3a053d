//! Testing utilities and mock implementations
//!
//! This module provides failing, panicking and blocking doubles for the job
//! pipeline so failure paths can be tested without real I/O faults.

pub mod mocks;

pub use mocks::*;
