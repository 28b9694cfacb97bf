//! Command-line front end for sticker-sheet production.

pub mod commands;
pub mod config;
pub mod output;

pub use config::WorkerConfig;
