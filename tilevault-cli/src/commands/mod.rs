//! CLI command implementations.

pub mod common;
pub mod config;
pub mod info;
pub mod tile;
pub mod tilejson;
