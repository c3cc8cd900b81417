mod db;
mod run;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::db::DbCommands;
use crate::run::RunCommands;

#[derive(Debug, Parser)]
#[command(name = "leadhound-cli")]
#[command(about = "LeadHound operator command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Create, execute and inspect lead-discovery runs
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("leadhound-cli: pass --help to list commands");
        return Ok(());
    };

    let config = leadhound_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = leadhound_db::PoolConfig::from_app_config(&config);
    let pool = leadhound_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => db::run_db_command(&pool, command).await,
        Commands::Run { command } => run::run_run_command(&pool, &config, command).await,
    }
}
