//! kicad-liberator: copy the library items a KiCad project uses into the
//! project and point every reference at the copies

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use liberator_core::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kicad-liberator", version, about)]
struct Args {
    /// Source project directory (holds exactly one .kicad_pro file)
    #[arg(short = 'i', long = "input", value_name = "DIR")]
    input: PathBuf,

    /// Destination directory; must not exist yet
    #[arg(short = 'o', long = "output", value_name = "DIR")]
    output: PathBuf,

    /// KiCad configuration directory (the one holding kicad_common.json)
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Shared data directory of the KiCad installation
    #[arg(long, value_name = "DIR")]
    install_dir: Option<PathBuf>,

    /// Nickname of the local libraries (default: project name)
    #[arg(long, value_name = "NAME")]
    nickname: Option<String>,

    /// Recover items missing from their libraries from the schematic cache
    /// and the board
    #[arg(long)]
    from_embedded: bool,

    /// Log every item
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(args) {
        Ok(report) => {
            summarize(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(args: &Args) {
    let default = if args.verbose {
        "debug"
    } else if args.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> anyhow::Result<Report> {
    let config = HostConfig::discover_with(args.config_dir, args.install_dir)
        .context("Failed to find the KiCad configuration")?;

    let options = LiberateOptions {
        nickname: args.nickname,
        from_embedded: args.from_embedded,
    };
    let report = Liberator::new(config, options)
        .run(&args.input, &args.output)
        .with_context(|| {
            format!(
                "Failed to liberate {} into {}",
                args.input.display(),
                args.output.display()
            )
        })?;
    Ok(report)
}

fn summarize(report: &Report) {
    tracing::info!(
        "Project '{}': {} symbols, {} footprints and {} model files copied into '{}', {} references rewritten",
        report.project,
        report.symbols.len(),
        report.footprints.len(),
        report.models.len(),
        report.nickname,
        report.rewritten_sites
    );

    if !report.is_clean() {
        eprintln!(
            "{} item(s) could not be liberated and still point at system libraries:",
            report.warnings.len()
        );
        for warning in &report.warnings {
            eprintln!("  - {}", warning);
        }
    }
}
