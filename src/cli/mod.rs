//! CLI Module
//!
//! Command-line interface for trimming and fading WAV files.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Audioclip - cut, fade out and re-encode the audio of a media file
#[derive(Parser, Debug)]
#[command(name = "audioclip")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Cut a window out of a WAV file, fade its tail and write it to a new WAV file
    #[command(name = "process")]
    Process(ProcessArgs),

    /// Print the audio track format of a WAV file
    #[command(name = "probe")]
    Probe {
        /// Input WAV file
        input: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProcessArgs {
    /// Input WAV file (16-bit PCM)
    pub input: PathBuf,

    /// Output WAV file
    pub output: PathBuf,

    /// Window start in microseconds
    #[arg(long)]
    pub start_us: Option<i64>,

    /// Window end in microseconds (defaults to the end of the input)
    #[arg(long)]
    pub end_us: Option<i64>,

    /// Fade-out length in microseconds
    #[arg(long)]
    pub fade_us: Option<i64>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output bit rate in bits per second
    #[arg(long)]
    pub bit_rate: Option<u32>,

    /// Loop the window from 0 until the output is this long
    #[arg(long)]
    pub loop_duration_us: Option<i64>,

    /// Fade at the end of every loop pass but the last
    #[arg(long, requires = "loop_duration_us")]
    pub loop_fade_us: Option<i64>,
}
