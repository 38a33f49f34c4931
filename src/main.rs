//! iptables-reconcile - idempotent iptables rule and policy management
//!
//! Brings one iptables rule, chain policy or flush into the requested state and
//! prints a JSON report on stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Ensure SSH is accepted (appended if missing)
//! iptables-reconcile --chain INPUT --protocol tcp --destination-port 22 --jump ACCEPT
//!
//! # Remove a rule, reporting only (no mutation)
//! iptables-reconcile --check --state absent --chain INPUT --source 10.0.0.1 --jump DROP
//!
//! # Set a chain policy on both families
//! iptables-reconcile --chain FORWARD --policy DROP --ip-version both
//!
//! # Parameters from a JSON document (or "-" for stdin)
//! iptables-reconcile --params rule.json
//! ```
//!
//! # Exit Status
//!
//! 0 on success (changed or not), 1 on any failure.

use clap::Parser;
use iptables_reconcile::config::load_settings;
use iptables_reconcile::core::error::IptablesErrorPattern;
use iptables_reconcile::exec::{SystemResolver, SystemRunner};
use iptables_reconcile::report::Report;
use iptables_reconcile::{Error, Outcome, Reconciler, Result, RuleParams, RuleSpec, utils};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "iptables-reconcile", version)]
#[command(about = "Idempotently reconcile an iptables rule, chain policy or flush", long_about = None)]
struct Cli {
    /// Report what would change without running any mutating command
    #[arg(long)]
    check: bool,

    /// Read rule parameters from a JSON file ("-" for stdin) instead of flags
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Settings file (default: $XDG_CONFIG_HOME/iptables-reconcile/config.json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(flatten)]
    rule: RuleParams,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (report, status) = match run(&cli) {
        Ok(outcome) => (Report::from_outcome(outcome), ExitCode::SUCCESS),
        Err(e) => {
            error!("{e}");
            if let Error::Mutation { stderr, .. } = &e {
                let translation = IptablesErrorPattern::match_error(stderr);
                warn!("{}", translation.user_message);
                for suggestion in &translation.suggestions {
                    warn!("  - {suggestion}");
                }
            }
            (Report::from_error(&e), ExitCode::FAILURE)
        }
    };

    match report.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: failed to serialize report: {e}");
            return ExitCode::FAILURE;
        }
    }
    status
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<Outcome> {
    let params = load_params(cli)?;
    let spec = RuleSpec::from_params(&params)?;
    let settings = load_settings(cli.config.as_deref())?;

    if !utils::is_root() {
        warn!("Not running as root; iptables will likely refuse to run");
    }

    let mut reconciler =
        Reconciler::new(SystemRunner, SystemResolver::new(settings)).simulate(cli.check);
    reconciler.reconcile(&spec)
}

fn load_params(cli: &Cli) -> Result<RuleParams> {
    let Some(path) = &cli.params else {
        return Ok(cli.rule.clone());
    };

    if cli.rule != RuleParams::default() {
        return Err(Error::validation(
            "params",
            "--params cannot be combined with rule flags",
        ));
    }

    let json = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };

    serde_json::from_str(&json).map_err(|e| Error::validation("params", e.to_string()))
}
