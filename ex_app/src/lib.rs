//! # ex_app
//!
//! Process wiring around `ex_ratelimit`: logging, configuration loading and
//! the `ex_burst` driver

pub mod cli;
pub mod config_loader;
pub mod shutdown_handler;
pub mod tracing_setup;
