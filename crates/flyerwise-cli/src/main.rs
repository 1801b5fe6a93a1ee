mod search;

use clap::{Parser, Subcommand};
use flyerwise_core::{AppConfig, ScoringConfig};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::search::SearchArgs;

#[derive(Debug, Parser)]
#[command(name = "flyerwise-cli")]
#[command(about = "Flyerwise operator command line interface")]
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
    /// Migration wizard session housekeeping
    Sessions {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Run the two-pass candidate search for a product and print the ranking
    Search(SearchArgs),
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[derive(Debug, Subcommand)]
enum SessionCommands {
    /// Delete sessions whose time budget has elapsed
    PurgeExpired,
    /// Print a stored session as JSON
    Show {
        #[arg(long)]
        id: Uuid,
    },
    /// List the offer snapshots recorded for a session
    Snapshots {
        #[arg(long)]
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("flyerwise-cli: run with --help to list commands");
        return Ok(());
    };

    let config = flyerwise_core::load_app_config_from_env()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool = connect(&config).await?;
    match command {
        Commands::Db { command } => run_db(&pool, command).await,
        Commands::Sessions { command } => run_sessions(&pool, &config, command).await,
        Commands::Search(args) => {
            let scoring = load_scoring(&config)?;
            search::run_search(&pool, &scoring, &args).await
        }
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let pool_config = flyerwise_db::PoolConfig::from_app_config(config);
    Ok(flyerwise_db::connect_pool(&config.database_url, pool_config).await?)
}

fn load_scoring(config: &AppConfig) -> anyhow::Result<ScoringConfig> {
    Ok(match &config.scoring_path {
        Some(path) => flyerwise_core::load_scoring(path)?,
        None => ScoringConfig::default(),
    })
}

async fn run_db(pool: &PgPool, command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            flyerwise_db::health_check(pool).await?;
            println!("database ok");
        }
        DbCommands::Migrate => {
            let applied = flyerwise_db::run_migrations(pool).await?;
            println!("applied {applied} migration(s)");
        }
    }
    Ok(())
}

async fn run_sessions(
    pool: &PgPool,
    config: &AppConfig,
    command: SessionCommands,
) -> anyhow::Result<()> {
    match command {
        SessionCommands::PurgeExpired => {
            let now = chrono::Utc::now();
            let retention = chrono::Duration::seconds(i64::try_from(config.completed_retention_secs)?);
            let purged = flyerwise_db::purge_expired_sessions(pool, now, now - retention).await?;
            tracing::info!(purged, "expired sessions purged");
            println!("purged {purged} expired session(s)");
        }
        SessionCommands::Show { id } => match flyerwise_db::get_session(pool, id).await? {
            Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
            None => anyhow::bail!("session {id} not found"),
        },
        SessionCommands::Snapshots { id } => {
            let rows = flyerwise_db::list_snapshots_for_session(pool, id).await?;
            if rows.is_empty() {
                println!("no snapshots for session {id}");
            }
            for row in rows {
                println!(
                    "{item}  #{rank:<2} {store:<12} {price:>8}  {score:>6.2}  {mark}{explanation}",
                    item = row.item_id,
                    rank = row.rank,
                    store = row.store_id,
                    price = row.price,
                    score = row.score,
                    mark = if row.selected { "* " } else { "  " },
                    explanation = row.explanation,
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
