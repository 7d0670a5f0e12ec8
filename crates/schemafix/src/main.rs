//! schemafix CLI
//!
//! Compares a reference database against a live target and applies (or
//! prints) the additive corrections that bring the target's schema in line.

use anyhow::Context;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use schemafix::prelude::*;

/// Synchronize a target database schema with a reference database schema.
#[derive(Parser)]
#[command(name = "schemafix")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Connection URL of the reference database.
    #[arg(long, env = "SOURCE_URL")]
    source_url: String,

    /// Connection URL of the target database to correct.
    #[arg(long, env = "TARGET_URL")]
    target_url: String,

    /// Schema name (e.g. public). Dialect default when omitted.
    #[arg(long)]
    schema: Option<String>,

    /// Lock-wait timeout in seconds (dialect-specific).
    #[arg(long, default_value_t = 10)]
    lock_timeout: u64,

    /// Statement timeout in seconds, 0 = unlimited (dialect-specific).
    #[arg(long, default_value_t = 0)]
    statement_timeout: u64,

    /// Apply changes (otherwise dry-run).
    #[arg(long)]
    apply: bool,

    /// Print the dry-run plan as JSON instead of SQL blocks.
    #[arg(long)]
    json: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level: Level = cli
        .log_level
        .parse()
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = CorrectorOptions {
        schema: cli.schema,
        lock_timeout_seconds: cli.lock_timeout,
        statement_timeout_seconds: cli.statement_timeout,
    };

    let corrector = SchemaCorrector::connect(&cli.source_url, &cli.target_url, options).await?;

    let plan = corrector.diff().await?;

    if !cli.apply && cli.json {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    corrector.apply(&plan, !cli.apply).await?;
    Ok(())
}
