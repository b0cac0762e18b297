use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::media::config::{BackendKind, ScanErrorPolicy};

#[derive(Debug, Parser)]
#[command(
    name = "media-ingest",
    version,
    about = "Import new videos from a camera card, deduplicated by content hash"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan, then archive or upload every file not yet in the manifest.
    Ingest(IngestArgs),
    /// List files not yet in the manifest without processing them.
    Scan(ScanArgs),
    /// Show resolved paths, configuration and manifest counts.
    Status(StatusArgs),
    /// Check manifest invariants, optionally rehashing a directory against it.
    Verify(VerifyArgs),
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Directory to scan instead of detecting a removable volume.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Manifest file (default: $INGEST_HOME/video_mapping.json).
    #[arg(long, alias = "json-file")]
    manifest: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct IngestArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// `archive` or `upload`.
    #[arg(long)]
    backend: Option<BackendKind>,

    #[arg(long)]
    archive_dir: Option<PathBuf>,

    /// Where the upload backend puts files when no endpoint is set.
    #[arg(long)]
    outbox_dir: Option<PathBuf>,

    /// HTTP endpoint for the upload backend.
    #[arg(long)]
    endpoint: Option<String>,

    /// Delete the source file after a confirmed upload.
    #[arg(long)]
    delete_source: bool,

    /// `abort` (default) or `skip` unreadable directories and files.
    #[arg(long)]
    on_scan_error: Option<ScanErrorPolicy>,

    #[arg(long)]
    progress: bool,

    /// Report new files without processing them.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct ScanArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    on_scan_error: Option<ScanErrorPolicy>,
}

#[derive(Debug, Args)]
struct StatusArgs {
    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Debug, Args)]
struct VerifyArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Hash the files under --dir (or the detected volume) against the manifest.
    #[arg(long)]
    rehash: bool,

    /// With --rehash, fail when any of those files is missing from the manifest.
    #[arg(long, requires = "rehash")]
    strict: bool,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{}: {}",
        report.command,
        if report.ok { "ok" } else { "issues" }
    );
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match cli.command {
        Command::Ingest(args) => commands::ingest::run(&commands::ingest::IngestOptions {
            dir: args.source.dir,
            manifest: args.source.manifest,
            backend: args.backend,
            archive_dir: args.archive_dir,
            outbox_dir: args.outbox_dir,
            endpoint: args.endpoint,
            delete_source: args.delete_source,
            on_scan_error: args.on_scan_error,
            progress: args.progress,
            dry_run: args.dry_run,
        })?,
        Command::Scan(args) => commands::scan::run(&commands::scan::ScanOptions {
            dir: args.source.dir,
            manifest: args.source.manifest,
            on_scan_error: args.on_scan_error,
        })?,
        Command::Status(args) => commands::status::run(&commands::status::StatusOptions {
            manifest: args.source.manifest,
            dir: args.source.dir,
        })?,
        Command::Verify(args) => commands::verify::run(&commands::verify::VerifyOptions {
            manifest: args.source.manifest,
            dir: args.source.dir,
            rehash: args.rehash,
            strict: args.strict,
        })?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        bail!(
            "{} finished with {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}
