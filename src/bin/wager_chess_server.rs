use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use wager_chess::config::{
    ClockPolicy, CoreConfig, DEFAULT_INVITE_TTL_SECS, DEFAULT_PLATFORM_FEE_BPS,
    DEFAULT_QUEUE_TIMEOUT_SECS,
};
use wager_chess::context::{CoreContext, SystemClock};
use wager_chess::db::create_schema;
use wager_chess::notify::BroadcastNotifier;
use wager_chess::server::{run_server, ServerConfig};
use wager_chess::store::{CoreStorage, InMemoryCoreStorage, SeaOrmCoreStorage};

const LOG_TARGET: &str = "bin::wager_chess_server";
const DEFAULT_BIND: &str = "127.0.0.1:4000";

#[derive(Debug, Parser)]
#[command(name = "wager_chess_server")]
#[command(about = "Serve the wagered chess API", long_about = None)]
struct Args {
    /// Address to bind the HTTP server to (host:port)
    #[arg(long, env = "SERVER_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// SeaORM-compatible Postgres URL; state is kept in memory when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Create missing tables on startup
    #[arg(long, env = "CREATE_SCHEMA", default_value_t = false)]
    create_schema: bool,

    /// Seconds a queue ticket waits before it expires
    #[arg(long, env = "QUEUE_TIMEOUT_SECS", default_value_t = DEFAULT_QUEUE_TIMEOUT_SECS)]
    queue_timeout_secs: i64,

    /// Seconds an unclaimed invite stays joinable
    #[arg(long, env = "INVITE_TTL_SECS", default_value_t = DEFAULT_INVITE_TTL_SECS)]
    invite_ttl_secs: i64,

    /// Platform fee in basis points of the pot
    #[arg(long, env = "PLATFORM_FEE_BPS", default_value_t = DEFAULT_PLATFORM_FEE_BPS)]
    platform_fee_bps: u32,

    /// Derive clocks server-side and accept client values within this many ms
    #[arg(long, env = "CLOCK_TOLERANCE_MS")]
    clock_tolerance_ms: Option<i64>,

    /// Seconds between expiry sweeps
    #[arg(
        long,
        env = "SWEEP_INTERVAL_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    sweep_interval_secs: u64,

    /// Shared secret internal callers present in `x-service-token`
    #[arg(long, env = "SERVICE_TOKEN", hide_env_values = true)]
    service_token: Option<String>,

    /// Toggle structured (JSON) logs
    #[arg(long, env = "SERVER_LOG_JSON", default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = Args::parse();
    init_tracing(args.json)?;

    let config = core_config(&args)?;
    let storage = build_storage(&args).await?;
    let notifier = Arc::new(BroadcastNotifier::default());
    let ctx = CoreContext::new(storage, notifier.clone(), Arc::new(SystemClock), config)
        .context("invalid core configuration")?;

    run_server(
        Arc::new(ctx),
        notifier,
        ServerConfig {
            bind: args.bind,
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
            service_token: args.service_token,
        },
    )
    .await
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);

    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

fn core_config(args: &Args) -> Result<CoreConfig> {
    let clock_policy = match args.clock_tolerance_ms {
        Some(tolerance_ms) => ClockPolicy::ServerAuthoritative { tolerance_ms },
        None => ClockPolicy::TrustClient,
    };
    Ok(CoreConfig {
        queue_timeout: seconds(args.queue_timeout_secs, "QUEUE_TIMEOUT_SECS")?,
        invite_ttl: seconds(args.invite_ttl_secs, "INVITE_TTL_SECS")?,
        platform_fee_bps: args.platform_fee_bps,
        clock_policy,
        ..CoreConfig::default()
    })
}

fn seconds(value: i64, name: &str) -> Result<chrono::Duration> {
    chrono::Duration::try_seconds(value)
        .with_context(|| format!("{name}={value} is out of range"))
}

async fn build_storage(args: &Args) -> Result<Arc<dyn CoreStorage>> {
    let Some(database_url) = args.database_url.as_deref() else {
        warn!(
            target = LOG_TARGET,
            "DATABASE_URL not set; state lives in memory and is lost on exit"
        );
        return Ok(Arc::new(InMemoryCoreStorage::new()));
    };

    let db = connect_database(database_url).await?;
    if args.create_schema {
        create_schema(&db).await.context("failed to create schema")?;
    }
    info!(target = LOG_TARGET, "using postgres storage");
    Ok(Arc::new(SeaOrmCoreStorage::new(db)))
}

async fn connect_database(database_url: &str) -> Result<DatabaseConnection> {
    let mut opts = ConnectOptions::new(database_url.to_owned());
    opts.max_connections(5)
        .min_connections(1)
        .sqlx_logging(true);
    Database::connect(opts)
        .await
        .with_context(|| format!("failed to connect to database at {}", database_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["wager_chess_server"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn durations_out_of_range_are_reported() {
        let err = core_config(&args(&["--queue-timeout-secs", &i64::MAX.to_string()]))
            .expect_err("overflowing timeout");
        assert!(err.to_string().contains("QUEUE_TIMEOUT_SECS"));

        let err = core_config(&args(&["--invite-ttl-secs", &i64::MAX.to_string()]))
            .expect_err("overflowing ttl");
        assert!(err.to_string().contains("INVITE_TTL_SECS"));
    }

    #[test]
    fn defaults_build_a_config() -> Result<()> {
        let config = core_config(&args(&[]))?;
        assert_eq!(
            config.queue_timeout,
            chrono::Duration::seconds(DEFAULT_QUEUE_TIMEOUT_SECS)
        );
        assert!(matches!(config.clock_policy, ClockPolicy::TrustClient));
        Ok(())
    }
}
