/// Openloop library - trace-driven, open-loop load generation for
/// prediction services. Exposes modules for testing and external use.
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;
pub mod payload;
pub mod report;
pub mod session;
pub mod trace;
