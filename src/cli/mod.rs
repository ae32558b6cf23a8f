//! CLI interface for rrd2prom

use clap::{Parser, Subcommand};
use rrd2prom::config::OutputFormat;
use rrd2prom::logging::LogFormat;
use std::path::PathBuf;

/// Republish the latest values of RRD files as metric events
#[derive(Parser)]
#[command(name = "rrd2prom")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "compact", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll sources and print events until interrupted
    Run {
        /// Configuration file path
        #[arg(short, long, default_value = "rrd2prom.yaml")]
        config: PathBuf,

        /// Poll a single RRD file or URL instead of using a config file
        #[arg(short, long)]
        url: Option<String>,

        /// Name for the source given with --url
        #[arg(short, long, default_value = "default")]
        name: String,

        /// Event output format (overrides the config file)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Validate a configuration file and open each source once
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "rrd2prom.yaml")]
        config: PathBuf,
    },

    /// Generate an example configuration file
    Init,
}
