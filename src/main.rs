use anyhow::Result;
use buildgate::config::GateConfig;
use buildgate::notify::SendmailNotifier;
use buildgate::scan::Scanner;
use buildgate::signature::GpgvOracle;
use buildgate::toolcheck;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "buildgate", about = "Signed package-submission admission gate", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Sweep the watch directory once, admitting every verified bundle
    Run {
        /// Gate configuration (JSON)
        #[arg(long)]
        config: PathBuf,

        /// Verbose per-manifest progress output (overrides the config flag)
        #[arg(long)]
        debug: bool,
    },

    /// Probe for the external tools the gate delegates to
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Run { config, debug } => run_sweep(&config, debug),
        Cmd::Check => check_tools(),
    }
}

fn run_sweep(config_path: &Path, debug: bool) -> Result<()> {
    let mut config = GateConfig::load(config_path)?;
    if debug {
        config.debug = true;
    }

    let oracle = GpgvOracle::new();
    let notifier = SendmailNotifier::new(config.mail_from.clone());
    let report = Scanner::new(&config, &oracle, &notifier).run_once()?;

    println!(
        "→ sweep done: {} accepted, {} rejected, {} error(s)",
        report.accepted, report.rejected, report.errors
    );
    Ok(())
}

fn check_tools() -> Result<()> {
    let tools = toolcheck::detect_tools();
    let missing = tools.missing_tools_report();
    if missing.is_empty() {
        println!("✓ gpgv available");
        println!("✓ sendmail available");
    } else {
        for line in &missing {
            eprintln!("✗ {line}");
        }
    }
    Ok(())
}
