//! CLI module for toolgate
//!
//! Handles command-line argument parsing.

pub mod args;

pub use args::{Args, Commands, EstimateArgs, RunArgs, Verbosity};
