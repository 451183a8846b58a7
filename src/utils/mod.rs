//! Shared utilities: errors and logging setup.

pub mod error;
pub mod logging;

pub use error::{RecorderError, RecorderResult};
