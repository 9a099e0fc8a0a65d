//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Update command arguments.
#[derive(Debug, Args)]
pub struct UpdateCommand {
    /// Write the snapshot here instead of the configured path
    #[arg(long, value_name = "FILE")]
    pub snapshot: Option<PathBuf>,

    /// Append to this archive instead of the configured path
    #[arg(long, value_name = "FILE")]
    pub archive: Option<PathBuf>,
}

/// Render command arguments.
#[derive(Debug, Args)]
pub struct RenderCommand {
    /// Where the widget data comes from
    #[arg(short, long, value_enum, default_value = "api")]
    pub source: SourceArg,

    /// Output format
    #[arg(short, long, value_enum, default_value = "html")]
    pub format: OutputFormat,

    /// Inject the HTML fragment into this page instead of printing it
    #[arg(short, long, value_name = "FILE", conflicts_with = "format")]
    pub page: Option<PathBuf>,
}

/// Archive commands.
#[derive(Debug, Subcommand)]
pub enum ArchiveCommand {
    /// Show archive statistics
    Stats {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Widget data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SourceArg {
    /// Live sensor API
    #[default]
    Api,
    /// Snapshot written by the last update
    Snapshot,
}

/// Output format for the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// HTML fragment
    #[default]
    Html,
    /// Plain text
    Plain,
    /// JSON output
    Json,
}
