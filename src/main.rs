use anyhow::{bail, Context};
use dotenvy::dotenv;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use deskserver::core::config::AppConfig;
use deskserver::core::shared::state::AppState;
use deskserver::core::shared::utils::{create_conn, run_migrations};
use deskserver::main_module::run_axum_server;

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    migrate_only: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--migrate-only" => parsed.migrate_only = true,
            "--help" | "-h" => {
                println!("Usage: deskserver [--config <path>] [--migrate-only]");
                std::process::exit(0);
            }
            other => bail!("Unknown argument: {other}"),
        }
    }
    Ok(parsed)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Also installs the `log` bridge so `log::info!` lands in the same output.
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .finish()
        .try_init()
    {
        eprintln!("Logging already initialized: {e}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_logging();

    let args = parse_args(std::env::args().skip(1))?;
    let config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let pool = create_conn(&config.database).context("Failed to create database pool")?;
    let applied = run_migrations(&pool).context("Failed to run migrations")?;
    info!("Applied {applied} pending migrations");

    if args.migrate_only {
        return Ok(());
    }

    let state = Arc::new(AppState::new(pool, config));
    run_axum_server(state).await?;

    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_args(args(&["--config", "desk.toml", "--migrate-only"])).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("desk.toml")));
        assert!(parsed.migrate_only);

        assert!(parse_args(args(&["--config"])).is_err());
        assert!(parse_args(args(&["--verbose"])).is_err());
    }
}
