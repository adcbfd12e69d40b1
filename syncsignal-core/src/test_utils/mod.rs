//! Helpers shared by unit tests, the scenario suite and integration tests

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::*;
pub use fixtures::*;
