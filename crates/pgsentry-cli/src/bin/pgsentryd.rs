//! `pgsentryd` — the long-running per-host agent. Loads configuration,
//! connects to the local PostgreSQL instance and the ZooKeeper-shaped DCS,
//! chooses a replication manager variant, and runs the control loop until
//! SIGTERM (spec §4, §5).

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pgsentry_config::{ConfigLoader, PgSentryConfig};
use pgsentry_controller::Controller;
use pgsentry_db::PgClient;
use pgsentry_dcs::{Dcs, ZkConfig, ZkDcs};
use pgsentry_replication::{Quorum, ReplicationManager, SingleSync};
use pgsentry_types::HostId;
use sqlx::postgres::PgConnectOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgsentryd")]
#[command(author, version, about = "PostgreSQL high-availability agent", long_about = None)]
struct Args {
    /// Path to the pgsentry config file.
    #[arg(short = 'c', long = "config", default_value = "/etc/pgsentry.conf")]
    config_file: String,
}

fn init_logging(config: &PgSentryConfig) {
    let filter = EnvFilter::try_new(&config.global.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Splits a libpq keyword/value conninfo string (`"dbname=postgres
/// user=postgres connect_timeout=1"`) into a [`PgConnectOptions`]. The
/// agent always speaks to its co-located instance over these strings
/// rather than a `postgres://` URL, matching how the original passed
/// conninfo straight through to the driver.
fn parse_conninfo(conninfo: &str) -> Result<PgConnectOptions> {
    let mut options = PgConnectOptions::new();
    for pair in conninfo.split_whitespace() {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("malformed conninfo fragment: {pair}"))?;
        options = match key {
            "dbname" => options.database(value),
            "user" => options.username(value),
            "password" => options.password(value),
            "host" => options.host(value),
            "port" => options.port(value.parse().context("invalid port in conninfo")?),
            // No per-connection equivalent in sqlx; the pool's
            // acquire_timeout (set in `PgClient::connect`) covers it.
            "connect_timeout" => options,
            _ => options,
        };
    }
    Ok(options)
}

async fn build_dcs(config: &PgSentryConfig) -> Result<Arc<dyn Dcs>> {
    let auth = if config.global.zk_auth {
        match (&config.global.zk_username, &config.global.zk_password) {
            (Some(user), Some(pass)) => Some(format!("digest:{user}:{pass}")),
            _ => None,
        }
    } else {
        None
    };
    let zk_config = ZkConfig {
        hosts: config.global.zk_hosts.clone(),
        chroot: config.global.zk_lockpath_prefix.clone(),
        session_timeout: config.global.zk_connect_max_delay,
        auth,
    };
    let dcs = ZkDcs::connect(&zk_config).await.context("connecting to zookeeper")?;
    Ok(Arc::new(dcs))
}

async fn build_replication(
    config: &PgSentryConfig,
    db: Arc<PgClient>,
    dcs: Arc<dyn Dcs>,
) -> Arc<dyn ReplicationManager> {
    let timeout = config.replica.primary_unavailability_timeout;
    if config.global.quorum_commit {
        Arc::new(Quorum::new(db, dcs, config.primary.clone(), timeout))
    } else {
        Arc::new(SingleSync::new(db, dcs, config.primary.clone(), timeout))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match ConfigLoader::new().with_config_file(&args.config_file).load() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("failed to load config: {error}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(%error, "pgsentryd exiting with error");
            ExitCode::FAILURE
        }
    }
}

/// Reads the local hostname via the `hostname` binary; the agent never
/// needs more than its own fqdn at startup so a one-shot subprocess beats
/// pulling in a libc binding for this alone.
fn local_hostname() -> Result<String> {
    let output = std::process::Command::new("hostname").output().context("running hostname(1)")?;
    let name = String::from_utf8(output.stdout).context("hostname(1) produced non-utf8 output")?;
    Ok(name.trim().to_string())
}

async fn run(config: PgSentryConfig) -> Result<()> {
    let host = HostId::new(local_hostname()?);
    info!(%host, "starting pgsentryd");

    let cmd = pgsentry_cmd::CommandRunner::new(config.commands.clone());
    let options = parse_conninfo(&config.global.local_conn_string)?;
    let db = Arc::new(
        PgClient::connect(options, cmd, config.global.pgdata.to_string_lossy().into_owned())
            .await
            .context("connecting to local postgresql")?,
    );

    let dcs = build_dcs(&config).await?;
    let replication = build_replication(&config, db.clone(), dcs.clone()).await;

    let cancel = CancellationToken::new();
    let mut controller = Controller::new(db, dcs, replication, config, host, cancel);
    controller.run().await.context("control loop exited with error")?;
    Ok(())
}
