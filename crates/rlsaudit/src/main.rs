//! rlsaudit CLI
//!
//! Usage:
//!     rlsaudit /etc/rlsaudit.toml [CHAIN] [--silent] [-v]

use anyhow::Context;
use clap::Parser;
use rlsaudit::{announce_all, AnnounceSink, Announcer, AuditConfig, RunContext, SiteLogSink, TracingSink};
use rlsaudit_logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rlsaudit", version, about = "Find and announce incomplete releases")]
struct Cli {
    /// Path to the TOML configuration file
    config: PathBuf,

    /// Announce chain; defaults to `chain` from the config
    chain: Option<String>,

    /// Log announces locally instead of writing them to the site log
    #[arg(long)]
    silent: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AuditConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    let chain = config.resolve_chain(cli.chain.as_deref())?;

    init_logging(LogConfig {
        app_name: "rlsaudit",
        verbose: cli.verbose || config.logging.verbose,
        log_dir: config.logging.dir.as_deref(),
    })?;

    let ctx = RunContext::bootstrap(config).context("Failed to start audit")?;
    let summary = rlsaudit::run(&ctx);

    let announcer = Announcer::new(&ctx.config);
    let mut sink: Box<dyn AnnounceSink> = if cli.silent {
        Box::new(TracingSink)
    } else {
        Box::new(SiteLogSink::new(
            ctx.config.site.log.clone(),
            chain,
            Duration::from_millis(ctx.config.announce.delay_ms),
        ))
    };
    announce_all(sink.as_mut(), &announcer, &summary.findings);

    Ok(())
}
