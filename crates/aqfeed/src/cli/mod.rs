//! Command-line interface for aqfeed.
//!
//! This module provides the CLI structure for the `aqfeed` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ArchiveCommand, ConfigCommand, OutputFormat, RenderCommand, SourceArg, UpdateCommand,
};

/// aqfeed - Live air-quality data for the group website
///
/// Fetches readings from the AirQo sensor API, keeps a snapshot and CSV
/// archive of them, and renders the air-quality widget for static pages.
#[derive(Debug, Parser)]
#[command(name = "aqfeed")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch readings, write the snapshot and append to the archive
    Update(UpdateCommand),

    /// Render the air-quality widget
    Render(RenderCommand),

    /// Inspect the CSV archive
    #[command(subcommand)]
    Archive(ArchiveCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "aqfeed");
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(
            parse(&["aqfeed", "-q", "update"]).verbosity(),
            crate::logging::Verbosity::Quiet
        );
        assert_eq!(
            parse(&["aqfeed", "update"]).verbosity(),
            crate::logging::Verbosity::Normal
        );
        assert_eq!(
            parse(&["aqfeed", "-v", "update"]).verbosity(),
            crate::logging::Verbosity::Verbose
        );
        assert_eq!(
            parse(&["aqfeed", "-vv", "update"]).verbosity(),
            crate::logging::Verbosity::Trace
        );
    }

    #[test]
    fn test_parse_update() {
        let cli = parse(&["aqfeed", "update", "--archive", "/tmp/a.csv"]);
        let Command::Update(cmd) = cli.command else {
            panic!("expected update");
        };
        assert_eq!(cmd.archive, Some(PathBuf::from("/tmp/a.csv")));
        assert!(cmd.snapshot.is_none());
    }

    #[test]
    fn test_parse_render_defaults() {
        let cli = parse(&["aqfeed", "render"]);
        let Command::Render(cmd) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(cmd.source, SourceArg::Api);
        assert_eq!(cmd.format, OutputFormat::Html);
        assert!(cmd.page.is_none());
    }

    #[test]
    fn test_parse_render_snapshot_page() {
        let cli = parse(&["aqfeed", "render", "-s", "snapshot", "--page", "index.html"]);
        let Command::Render(cmd) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(cmd.source, SourceArg::Snapshot);
        assert_eq!(cmd.page, Some(PathBuf::from("index.html")));
    }

    #[test]
    fn test_render_page_conflicts_with_format() {
        let result = Cli::try_parse_from(["aqfeed", "render", "-f", "json", "-p", "x.html"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_archive_stats() {
        let cli = parse(&["aqfeed", "archive", "stats", "--json"]);
        assert!(matches!(
            cli.command,
            Command::Archive(ArchiveCommand::Stats { json: true })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["aqfeed", "-c", "/custom/config.toml", "config", "path"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Path)));
    }
}
