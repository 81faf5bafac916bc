use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ringside::battle::{BattleSpec, SideSpec};
use ringside::bot::ConnectionPool;
use ringside::config::Config;

/// Coordinate one scripted battle between two bot accounts.
#[derive(Debug, Parser)]
#[command(name = "ringside", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "ringside.toml")]
    config: PathBuf,

    /// Message posted into the battle room once it opens.
    #[arg(long)]
    message: String,

    /// Challenge format string (ruleset and tier restrictions).
    #[arg(long)]
    chalcode: String,

    /// File holding the first side's packed team.
    #[arg(long)]
    team1: PathBuf,

    /// File holding the second side's packed team.
    #[arg(long)]
    team2: PathBuf,

    /// Candidate usernames for the first side, comma separated.
    #[arg(long, value_delimiter = ',')]
    side1: Vec<String>,

    /// Candidate usernames for the second side, comma separated.
    #[arg(long, value_delimiter = ',')]
    side2: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    let accounts = config.bot_accounts()?;

    let team1 = fs::read_to_string(&cli.team1)
        .with_context(|| format!("reading team file {}", cli.team1.display()))?;
    let team2 = fs::read_to_string(&cli.team2)
        .with_context(|| format!("reading team file {}", cli.team2.display()))?;

    let mut spec = BattleSpec::new(
        cli.message,
        cli.chalcode,
        SideSpec::new(team1.trim(), cli.side1),
        SideSpec::new(team2.trim(), cli.side2),
    );

    let pool = ConnectionPool::connect(accounts, config.server).await?;

    let outcome = run(&pool, &mut spec).await;
    pool.shutdown("driver exiting");
    outcome
}

async fn run(pool: &ConnectionPool, spec: &mut BattleSpec) -> Result<()> {
    let session = pool.run_battle(spec).await?;
    println!("{}", session.url);

    let link = session.result().await?;
    println!("{link}");
    Ok(())
}
