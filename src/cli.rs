use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};

#[derive(Debug, Parser)]
#[command(
    name = "zxsync",
    version,
    about = "Ingest channel ZIP drops into an additive published tree"
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
    /// Ingest the newest inbox archive (or --archive) into the published tree.
    Ingest {
        #[arg(long)]
        archive: Option<PathBuf>,
        /// Ingest even if the completion marker matches.
        #[arg(long)]
        force: bool,
    },
    /// Run one ingest cycle, or keep polling with --daemon.
    Watch {
        #[arg(long)]
        once: bool,
        #[arg(long)]
        daemon: bool,
    },
    /// Extract an archive with filename recovery and timestamp restoration.
    Extract { archive: PathBuf, destination: PathBuf },
    /// Merge SOURCE into DEST without deleting anything.
    Sync { source: PathBuf, destination: PathBuf },
    /// Show how an entry name would be recovered.
    Decode {
        name: String,
        /// NAME is the stored bytes in hex.
        #[arg(long)]
        hex: bool,
        /// Treat the entry as carrying the UTF-8 flag.
        #[arg(long)]
        utf8_flag: bool,
    },
    /// Paths, config, marker and lock state.
    Status,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("command={} ok={}", report.command, report.ok);
    for detail in &report.details {
        println!("{detail}");
    }
    for issue in &report.issues {
        println!("issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match cli.command {
        Command::Ingest { archive, force } => {
            commands::ingest::run(&commands::ingest::IngestCommandOptions { archive, force })?
        }
        Command::Watch { once, daemon } => {
            commands::watch::run(&commands::watch::WatchOptions { once, daemon })?
        }
        Command::Extract {
            archive,
            destination,
        } => commands::extract::run(&archive, &destination)?,
        Command::Sync {
            source,
            destination,
        } => commands::sync::run(&source, &destination)?,
        Command::Decode {
            name,
            hex,
            utf8_flag,
        } => commands::decode::run(&commands::decode::DecodeOptions {
            name,
            hex,
            utf8_flag,
        })?,
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
