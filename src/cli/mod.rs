//! Command-line interface.

mod commands;
mod output;

pub use commands::{Cli, Commands, GetCommands, OutputFormat, StateCommands};
pub use output::{MessageKind, OutputFormatter};
