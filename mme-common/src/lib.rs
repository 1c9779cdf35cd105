//! # MME Common Library
//!
//! Shared code for the music metadata engine:
//! - Error type used across crates
//! - TOML configuration model and loading
//! - Config file discovery and API key resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
