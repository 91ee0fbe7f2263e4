//! Sentinel Searcher keeps JSON data files current by asking a web-search
//! agent for schema-shaped data, validating it, and merging it into what is
//! already on disk.

pub mod agent;
pub mod anthropic;
pub mod cli;
pub mod config;
pub mod error;
pub mod git;
pub mod job;
pub mod merge;
pub mod orchestrator;
pub mod runner;
pub mod schema;
pub mod store;
pub mod telemetry;
pub mod ui;
