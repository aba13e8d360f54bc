pub mod catalog;
pub mod config;
pub mod constants;
pub mod core;
pub mod docker;
pub mod error;
pub mod executor;
pub mod logging;
pub mod manifest;
pub mod observer;
pub mod oci;
pub mod scheduler;
pub mod selector;
pub mod version;

pub use error::{ChainBuildError, ConfigError, Result};
