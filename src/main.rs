// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! otelship entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use otelship::config::{self, CliOptions, CorrelationMode, ResolvedConfig};
use otelship::cursor::StreamId;
use otelship::ingest::IngestSummary;
use otelship::pipeline::{CorrelationPipeline, RunReport, StatusReport};
use otelship::telemetry::{init_telemetry, TelemetryConfig};

/// otelship - ship agent telemetry into a store, idempotently.
#[derive(Parser)]
#[command(name = "otelship")]
#[command(author, version, about = "Import OTLP JSON-lines telemetry into a store", long_about = None)]
struct Cli {
    /// Span stream (JSON lines)
    #[arg(long, global = true, env = "OTELSHIP_TRACES_FILE")]
    traces_file: Option<PathBuf>,

    /// Metric stream (JSON lines)
    #[arg(long, global = true, env = "OTELSHIP_METRICS_FILE")]
    metrics_file: Option<PathBuf>,

    /// SQLite database file
    #[arg(long = "database", global = true, env = "OTELSHIP_DATABASE")]
    database_path: Option<PathBuf>,

    /// How the correlation lookup is built
    #[arg(long, global = true, value_enum, env = "OTELSHIP_CORRELATION_MODE")]
    correlation_mode: Option<Mode>,

    /// Records between cursor checkpoints
    #[arg(long, global = true)]
    checkpoint_interval: Option<u64>,

    /// Per-operation store timeout in milliseconds
    #[arg(long, global = true)]
    store_timeout_ms: Option<u64>,

    /// Parse and extract only; write nothing
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Delete all cursors before running
    #[arg(long)]
    reset_state: bool,

    /// Output format for reports
    #[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
    output_format: OutputFormat,

    /// Debug logging, one line per record
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Correlation lookup strategies.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// Rebuild from the whole span stream every run
    FullScan,
    /// Persist the lookup and scan only new span data
    Incremental,
}

impl From<Mode> for CorrelationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::FullScan => CorrelationMode::FullScan,
            Mode::Incremental => CorrelationMode::Incremental,
        }
    }
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Subcommands for otelship.
#[derive(Subcommand)]
enum Commands {
    /// Import new data from both streams (default)
    Run,

    /// Show cursors against the current files and sink counts
    Status,

    /// Delete all cursors so the next run starts from the beginning
    Reset,

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

/// Config subcommand actions.
#[derive(Subcommand)]
enum ConfigAction {
    /// Show the resolved configuration
    Show,
    /// Write an empty .otelship.json in the current directory
    Init,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let telemetry = if cli.verbose {
        TelemetryConfig::development()
    } else if cli.quiet {
        TelemetryConfig::production()
    } else {
        TelemetryConfig::default()
    };
    let _guard = match init_telemetry(&telemetry) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("{} could not initialize logging: {}", "warning:".yellow(), e);
            None
        }
    };

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "fatal");
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.output_format;
    let reset_state = cli.reset_state;
    let command = cli.command.unwrap_or(Commands::Run);

    let cli_options = CliOptions {
        traces_file: cli.traces_file,
        metrics_file: cli.metrics_file,
        database_path: cli.database_path,
        rewind_bytes: None,
        checkpoint_interval: cli.checkpoint_interval,
        store_timeout_ms: cli.store_timeout_ms,
        correlation_mode: cli.correlation_mode.map(CorrelationMode::from),
        dry_run: if cli.dry_run { Some(true) } else { None },
    };

    let workspace_root = std::env::current_dir()?;

    if let Commands::Config { action } = command {
        return handle_config(action, &workspace_root, cli_options);
    }

    let root = config::find_workspace_root(&workspace_root).unwrap_or(workspace_root);
    let config = config::load_config(&root, cli_options)?;
    let pipeline = CorrelationPipeline::from_config(&config)?;

    match command {
        Commands::Run => {
            if reset_state {
                let removed = pipeline.reset().await?;
                if format == OutputFormat::Text {
                    println!("{} {} cursor(s) reset", "↺".yellow(), removed);
                }
            }
            let report = pipeline.run().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => print_run_report(&report),
            }
        }
        Commands::Status => {
            let status = pipeline.status().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Text => print_status(&status, &config),
            }
        }
        Commands::Reset => {
            let removed = pipeline.reset().await?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "cursorsRemoved": removed }))
                }
                OutputFormat::Text => {
                    println!("{} {} cursor(s) deleted; sinks untouched", "✓".green(), removed)
                }
            }
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn handle_config(
    action: Option<ConfigAction>,
    workspace_root: &std::path::Path,
    cli_options: CliOptions,
) -> anyhow::Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let config = config::load_config(workspace_root, cli_options)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Some(ConfigAction::Init) => {
            let path = config::save_workspace_config(
                workspace_root,
                &config::WorkspaceConfig::default(),
                None,
            )?;
            println!("Created config file: {}", path.display());
        }
    }
    Ok(())
}

fn print_run_report(report: &RunReport) {
    let title = if report.dry_run {
        "Import summary (dry run)"
    } else {
        "Import summary"
    };
    println!("{}", title.bright_blue().bold());
    println!(
        "Run {}  mode {}  lookup {} calls / {} prompts",
        report.run_id.short().dimmed(),
        report.correlation_mode,
        report.calls,
        report.prompts
    );

    print_stream_summary(StreamId::Traces, &report.traces);
    print_stream_summary(StreamId::Metrics, &report.metrics);

    println!(
        "\nDocuments: {} prompt-records, {} metrics-records",
        report.prompt_documents.to_string().bright_white(),
        report.metrics_documents.to_string().bright_white()
    );
    println!("Elapsed: {:.2}s", report.elapsed_ms as f64 / 1000.0);
}

fn print_stream_summary(stream: StreamId, summary: &IngestSummary) {
    println!("\n{}", format!("## {}", stream).bright_cyan());

    if summary.file_missing {
        println!("  {}", "file not found; skipped".yellow());
        return;
    }
    if let Some(reason) = &summary.rotation {
        println!("  {} rotation detected: {}", "↻".yellow(), reason);
    }
    if summary.up_to_date {
        println!("  {}", "no new data".dimmed());
        return;
    }

    println!(
        "  lines processed: {} ({} -> {})",
        summary.lines_processed, summary.start_line, summary.end_line
    );
    let new_label = if summary.dry_run { "would insert" } else { "new records" };
    println!("  {}: {}", new_label, summary.new_records.to_string().green());
    println!("  duplicates skipped: {}", summary.duplicates);
    if summary.malformed_lines > 0 {
        println!("  malformed lines: {}", summary.malformed_lines.to_string().yellow());
    }
    if let (Some(first), Some(last)) = (&summary.first_time, &summary.last_time) {
        println!("  time range: {} .. {}", first, last);
    }
    if summary.unterminated_tail {
        println!("  {}", "stopped at a partially written line".dimmed());
    }
}

fn print_status(status: &StatusReport, config: &ResolvedConfig) {
    println!("{}", "Import status".bright_blue().bold());
    println!("Store: {} ({})", status.store, config.database_path.display());

    for stream in &status.streams {
        println!("\n{}", format!("## {}", stream.stream).bright_cyan());
        println!("  file: {}", stream.path.display());

        match &stream.cursor {
            Some(cursor) => {
                println!(
                    "  cursor: offset {} line {} ({} records inserted)",
                    cursor.byte_offset, cursor.line_number, cursor.records_inserted
                );
                if let Some(at) = cursor.last_processed_at {
                    println!("  last processed: {}", at.to_rfc3339());
                }
            }
            None => println!("  cursor: {}", "none (next run starts at 0)".dimmed()),
        }

        match &stream.fingerprint {
            Some(fp) => {
                println!("  size: {} bytes, generation {}", fp.size, fp.generation);
                let unprocessed = if stream.unprocessed_bytes == 0 {
                    "0".green()
                } else {
                    stream.unprocessed_bytes.to_string().yellow()
                };
                println!("  unprocessed: {} bytes", unprocessed);
                if let Some(reason) = &stream.rotation {
                    println!("  {} {}", "rotated:".yellow(), reason);
                }
            }
            None => println!("  {}", "file not found".yellow()),
        }
    }

    println!(
        "\nDocuments: {} prompt-records, {} metrics-records",
        status.prompt_documents, status.metrics_documents
    );
}
