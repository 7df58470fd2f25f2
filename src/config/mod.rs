//! Configuration module

pub mod cli;
pub mod settings;

pub use cli::{CliArgs, Command};
pub use settings::Settings;
