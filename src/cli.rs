use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use mf_core::{Container, JobKind, OverlayPosition};

#[derive(Parser)]
#[command(name = "mediaforge")]
#[command(author, version, about = "Media job pipeline: merge, encode, convert, watermark, trim, sample, inspect")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one job on local files and wait for the result
    Run(RunArgs),

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// List the configured encoding presets
    Presets,

    /// List recent tasks of a user
    Tasks {
        /// User id
        #[arg(long)]
        user: i64,

        /// Maximum number of tasks to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Cancel a user's active task and reset their session
    Cancel {
        /// User id
        #[arg(long)]
        user: i64,
    },

    /// Fail tasks left pending or running by a previous process
    ResetOrphans,

    /// Show user and task counts
    Stats,

    /// Display version information
    Version,
}

#[derive(Args)]
pub struct RunArgs {
    /// Job kind, e.g. merge_video_audio, encode, trim, mediainfo
    #[arg(short, long, value_parser = parse_job_kind)]
    pub job: JobKind,

    /// Input files, in the order they are submitted
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Encoding preset name (encode)
    #[arg(long)]
    pub preset: Option<String>,

    /// Trim range as start:end in seconds (trim)
    #[arg(long)]
    pub range: Option<String>,

    /// Sample length in seconds: 30, 60, 120 or 300 (sample)
    #[arg(long)]
    pub duration: Option<u32>,

    /// Watermark position (watermark)
    #[arg(long, value_parser = parse_position)]
    pub position: Option<OverlayPosition>,

    /// Delivery mode of the converted file (convert)
    #[arg(long, value_enum)]
    pub mode: Option<ConvertModeArg>,

    /// Output container
    #[arg(long, value_parser = parse_container)]
    pub container: Option<Container>,

    /// Deliver as a stream instead of a document
    #[arg(long)]
    pub stream: bool,

    /// Upload the result to object storage and print the link
    #[arg(long)]
    pub upload: bool,

    /// Directory that receives delivered results
    #[arg(short, long, default_value = "outbox")]
    pub out: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ConvertModeArg {
    ToDocument,
    ToStream,
}

fn parse_job_kind(s: &str) -> Result<JobKind, String> {
    s.parse()
}

fn parse_position(s: &str) -> Result<OverlayPosition, String> {
    s.parse()
}

fn parse_container(s: &str) -> Result<Container, String> {
    s.parse()
}
