use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use iec61937::structs::burst::RateFactor;

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    author     = env!("CARGO_PKG_AUTHORS"),
    long_version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (iec61937 ", env!("IEC61937_VERSION"),
        ", built ", env!("BUILD_TIMESTAMP"), ")"
    ),
    about      = "Tools for packing and unpacking MPEG-H 3D Audio over IEC 61937-13",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Pack the mhm1 track of an MP4 file into an IEC 61937-13 stream.
    Encode(EncodeArgs),

    /// Unpack an IEC 61937-13 stream into an MP4 file.
    Decode(DecodeArgs),
}

#[derive(Debug, Args)]
pub struct EncodeArgs {
    /// Input MP4 file with an mhm1 track.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output path for the raw IEC 61937-13 stream.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Sample-rate factor of the IEC 60958 link.
    #[arg(long, value_enum, default_value_t = Factor::X4)]
    pub factor: Factor,

    /// Swap each 16-bit word of the output (the stream itself is big-endian).
    #[arg(long)]
    pub swap: bool,
}

#[derive(Debug, Args)]
pub struct DecodeArgs {
    /// Input IEC 61937-13 stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output MP4 file.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Swap each 16-bit word of the input before decoding.
    #[arg(long)]
    pub swap: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Factor {
    /// Four times the base IEC 60958 rate.
    #[value(name = "4")]
    X4,
    /// Sixteen times the base IEC 60958 rate.
    #[value(name = "16")]
    X16,
}

impl Factor {
    pub fn rate_factor(self) -> RateFactor {
        match self {
            Factor::X4 => RateFactor::X4,
            Factor::X16 => RateFactor::X16,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}
