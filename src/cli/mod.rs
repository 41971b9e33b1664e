//! CLI interface for taper

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Fader level codec and live-console validation for X Air / M Air mixers
#[derive(Parser)]
#[command(name = "taper")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one level between float, index, dB, and OSC string
    Convert {
        /// Float level in [0, 1]
        #[arg(long, allow_hyphen_values = true, conflicts_with_all = ["index", "db"])]
        float: Option<f32>,

        /// Step index in [0, 1023]
        #[arg(long, conflicts_with = "db")]
        index: Option<u32>,

        /// dB string, e.g. "-10.4", "+2.0" or "-oo"
        #[arg(long, allow_hyphen_values = true)]
        db: Option<String>,
    },

    /// Print the full 1024-step level table
    Table {
        /// Only print rows where the dB string changes
        #[arg(long)]
        distinct: bool,
    },

    /// Find a console on the network
    Discover {
        /// Configuration file path
        #[arg(short, long, default_value = "taper.yaml")]
        config: PathBuf,
    },

    /// Set the channel fader on a live console
    Set {
        /// Configuration file path
        #[arg(short, long, default_value = "taper.yaml")]
        config: PathBuf,

        /// Float level in [0, 1]
        #[arg(long, allow_hyphen_values = true, conflicts_with = "db")]
        float: Option<f32>,

        /// dB string, e.g. "-10.4", "+2.0" or "-oo"
        #[arg(long, allow_hyphen_values = true)]
        db: Option<String>,
    },

    /// Query the channel fader on a live console
    Get {
        /// Configuration file path
        #[arg(short, long, default_value = "taper.yaml")]
        config: PathBuf,
    },

    /// Sweep fader levels on a live console and compare against the codec
    Verify {
        /// Configuration file path
        #[arg(short, long, default_value = "taper.yaml")]
        config: PathBuf,

        /// Override the configured number of sweep levels
        #[arg(short, long)]
        steps: Option<u32>,

        /// Log every probed level, not just mismatches
        #[arg(short, long)]
        verbose: bool,
    },

    /// Count distinct node dB strings on a live console
    Distinct {
        /// Configuration file path
        #[arg(short, long, default_value = "taper.yaml")]
        config: PathBuf,
    },

    /// Validate a configuration file
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "taper.yaml")]
        config: PathBuf,
    },

    /// Generate an example configuration file
    Init,
}
