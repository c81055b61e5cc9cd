//! Shared ambient stack for formel binaries
//!
//! - logging initialisation (console formats, daily rolling file)
//! - layered configuration loading (defaults, file, environment)

pub mod config;
pub mod error;
pub mod logging;

pub use config::{load_config, ENV_PREFIX};
pub use error::{Error, Result};
pub use logging::{init_logging, LogConfig, LogFormat};
