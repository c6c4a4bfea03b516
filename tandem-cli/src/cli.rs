//! CLI argument parsing definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tandem_config::LogLevel;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// First candidate port for the request channel
    #[arg(long, value_name = "PORT", global = true)]
    pub base_port: Option<u16>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bind the channel pair, print the ports and hold them until Ctrl-C
    Ports,

    /// Send a task request and print the result
    Task(TaskArgs),

    /// Send an array read from a file
    Array(ArrayArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

/// Options shared by commands that wait on the worker
#[derive(Args)]
pub struct WaitArgs {
    /// Give up waiting for a result after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Decode the result payload as big-endian f32 values
    #[arg(long)]
    pub values: bool,

    /// Send `quit` to the worker when done
    #[arg(long)]
    pub quit: bool,
}

#[derive(Args)]
pub struct TaskArgs {
    /// Operation for the worker to run
    pub operation: String,

    /// Input identifier (repeatable)
    #[arg(long = "input", value_name = "ID")]
    pub inputs: Vec<String>,

    /// Metadata entry as KEY=VALUE (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub metadata: Vec<(String, String)>,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Args)]
pub struct ArrayArgs {
    /// Array identifier
    pub id: String,

    /// Origin of the array, comma separated
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    pub origin: Vec<i64>,

    /// Shape of the array, comma separated
    #[arg(long, value_delimiter = ',')]
    pub shape: Vec<i64>,

    /// File holding the raw payload bytes
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,

    /// Metadata entry as KEY=VALUE (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub metadata: Vec<(String, String)>,

    /// Wait for a result after sending
    #[arg(long)]
    pub wait_result: bool,

    #[command(flatten)]
    pub wait: WaitArgs,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print a sample configuration with all defaults
    Sample,

    /// Validate a configuration file
    Validate {
        /// Configuration file to check
        path: PathBuf,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((key.to_string(), value.to_string()))
}
