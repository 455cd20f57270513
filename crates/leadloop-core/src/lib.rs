//! # LeadLoop Core
//!
//! Shared foundation for all LeadLoop crates: the configuration system
//! (`~/.leadloop/config.toml`) and the common error type.

pub mod config;
pub mod error;

pub use config::LeadLoopConfig;
pub use error::{LeadLoopError, Result};
