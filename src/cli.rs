use clap::{Parser, Subcommand};
use crate::logs::LogType;
use std::path::PathBuf;

/// servy CLI application
#[derive(Parser)]
#[command(name = "servy")]
#[command(about = "Run any executable as a supervised Windows service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Install a service, or update it if it already exists
    Install {
        /// Service configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Stop and remove a service
    Uninstall {
        /// Service name
        name: String,
    },
    /// Start a service
    Start {
        /// Service name
        name: String,
    },
    /// Stop a service
    Stop {
        /// Service name
        name: String,
    },
    /// Stop then start a service
    Restart {
        /// Service name
        name: String,
    },
    /// Show service status
    Status {
        /// Service name (optional, shows all if not specified)
        name: Option<String>,
    },
    /// List services installed through servy
    List,
    /// Show the dependency tree of a service
    Deps {
        /// Service name
        name: String,
    },
    /// Show captured output
    Logs {
        /// Capture file written by the wrapper
        path: PathBuf,
        /// Number of lines to show
        #[arg(short = 'n', long)]
        lines: Option<usize>,
        /// Log type to show
        #[arg(short = 't', long, default_value = "stdout")]
        log_type: LogType,
        /// Follow logs in real-time (like tail -f)
        #[arg(short, long)]
        follow: bool,
    },
    /// Diagnose executable issues
    Diagnose {
        /// Path to the executable
        exe: String,
    },
}
