//! Command implementations for the marlbench CLI.

pub mod checkpoint;
pub mod config;
pub mod validate;
