//! `aqfeed` - CLI for the group website's air-quality feed
//!
//! This binary updates the snapshot and archive files, renders the widget,
//! and inspects configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;

use aqfeed::cli::{
    ArchiveCommand, Cli, Command, ConfigCommand, OutputFormat, RenderCommand, SourceArg,
    UpdateCommand,
};
use aqfeed::widget::publish_to_page;
use aqfeed::{init_logging, run_update, ApiSource, Config, CsvArchive, SnapshotSource, Widget};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Update(update_cmd) => handle_update(&config, update_cmd).await,
        Command::Render(render_cmd) => handle_render(&config, render_cmd).await,
        Command::Archive(archive_cmd) => handle_archive(&config, &archive_cmd),
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
    }
}

async fn handle_update(config: &Config, cmd: UpdateCommand) -> anyhow::Result<()> {
    let snapshot = cmd
        .snapshot
        .unwrap_or_else(|| config.archive.snapshot_path.clone());
    let archive = cmd
        .archive
        .unwrap_or_else(|| config.archive.csv_path.clone());

    let source = ApiSource::from_config(config)?;
    let report = run_update(&source, &snapshot, &archive)
        .await
        .with_context(|| format!("updating from {}", source.url()))?;

    println!("Wrote recent JSON: {}", report.snapshot_path.display());
    println!(
        "Appended {} new archive rows to: {}",
        report.appended,
        report.archive_path.display()
    );
    Ok(())
}

async fn handle_render(config: &Config, cmd: RenderCommand) -> anyhow::Result<()> {
    let widget = Widget::new(&config.widget);

    let view = match cmd.source {
        SourceArg::Api => match ApiSource::from_config(config) {
            Ok(source) => widget.load(&source).await,
            Err(err) => widget.view_for_error(&err),
        },
        SourceArg::Snapshot => {
            widget
                .load(&SnapshotSource::new(&config.archive.snapshot_path))
                .await
        }
    };

    if let Some(page) = cmd.page {
        let changed = publish_to_page(&page, &view.render_html())?;
        if changed {
            println!("Updated widget in {}", page.display());
        } else {
            println!("Widget in {} already up to date", page.display());
        }
        return Ok(());
    }

    match cmd.format {
        OutputFormat::Html => print!("{}", view.render_html()),
        OutputFormat::Plain => print!("{}", view.render_plain()),
        OutputFormat::Json => println!("{}", view.render_json()?),
    }
    Ok(())
}

fn handle_archive(config: &Config, cmd: &ArchiveCommand) -> anyhow::Result<()> {
    match cmd {
        ArchiveCommand::Stats { json } => {
            let path = &config.archive.csv_path;
            if !path.exists() {
                println!("No archive at {}", path.display());
                return Ok(());
            }

            let stats = CsvArchive::open(path)?.stats()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
                    t.map_or_else(|| "-".to_string(), |t| t.to_rfc3339())
                };
                println!("aqfeed archive");
                println!("--------------");
                println!("Path:     {}", path.display());
                println!("Rows:     {}", stats.total_rows);
                println!("Devices:  {}", stats.devices);
                println!("Oldest:   {}", fmt_time(stats.oldest));
                println!("Newest:   {}", fmt_time(stats.newest));
                println!("Size:     {} bytes", stats.file_size_bytes);
            }
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let shown = config.redacted();
            if json {
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                let or_unset = |v: &Option<String>| v.clone().unwrap_or_else(|| "(unset)".into());
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[API]");
                println!("  Base URL:           {}", shown.api.base_url);
                println!("  Token:              {}", or_unset(&shown.api.token));
                println!("  Cohort id:          {}", or_unset(&shown.api.cohort_id));
                println!("  Timeout (secs):     {}", shown.api.timeout_secs);
                println!();
                println!("[Archive]");
                println!(
                    "  Snapshot path:      {}",
                    shown.archive.snapshot_path.display()
                );
                println!("  CSV path:           {}", shown.archive.csv_path.display());
                println!();
                println!("[Widget]");
                println!("  Title:              {}", shown.widget.title);
                println!("  Fallback message:   {}", shown.widget.fallback_message);
                println!("  Max readings:       {}", shown.widget.max_readings);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
