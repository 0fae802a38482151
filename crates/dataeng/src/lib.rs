#![forbid(unsafe_code)]

pub mod agent;
pub mod cli;
pub mod config;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod session;
pub mod utils;
pub mod verify;

pub use cli::app::{Cli, Command};
