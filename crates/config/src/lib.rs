//! Settings for the media-batch tools
//!
//! Handles loading the JSON settings file and environment variable overrides.

pub mod config;

pub use config::*;
