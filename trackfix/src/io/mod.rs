//! Side-effecting adapters: files, subprocesses and the generation backend.

pub mod artifacts;
pub mod builder;
pub mod config;
pub mod dataset;
pub mod execution;
pub mod generator;
pub mod process;
pub mod prompt;
pub mod report_store;
