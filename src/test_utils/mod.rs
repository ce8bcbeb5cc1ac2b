//! Test-only helpers shared across crate unit tests.
//!
//! Compiled for unit tests only; keeps the handler doubles, sample events and
//! the capturing logger out of the individual test files.

pub mod capture_logger;
pub mod collecting_handler;
pub mod events;
pub mod failing_handler;
