//! Command-line interface for the operator console binary.

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::command::{self, SendArgs};
use crate::config::{ConsoleCliArgs, ConsoleConfig};
use crate::demo;

#[derive(Parser, Debug)]
#[command(
    name = "agv-console",
    version,
    about = "Headless operator console for a small AGV fleet"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full console loop against synthetic camera, detector, and
    /// fleet sources.
    Demo(ConsoleCliArgs),
    /// Send one audited control command and print its audit record.
    Send(SendArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Demo(args) => demo::run(ConsoleConfig::try_from(args)?),
        Command::Send(args) => command::run_send(args),
    }
}
