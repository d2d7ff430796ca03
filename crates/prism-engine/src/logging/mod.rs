//! Logging setup.
//!
//! The crate logs through the `log` facade only; hosts choose the backend.
//! These helpers install `env_logger` for binaries and tests.

mod init;

pub use init::{DEFAULT_FILTER, LoggingConfig, init_logging, init_test_logging};
