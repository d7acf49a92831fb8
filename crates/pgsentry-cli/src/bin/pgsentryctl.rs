//! `pgsentryctl` — the operator's control surface over a pgsentry cluster:
//! seeding the DCS's member structure, toggling maintenance mode, planned
//! switchover and failover-state resets, and cluster introspection.
//! Ported from `cli.py`'s subcommands onto the same [`pgsentry_dcs::Dcs`]
//! seam the agent itself uses.

use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pgsentry_config::ConfigLoader;
use pgsentry_dcs::{paths, Dcs, DcsJsonExt, LockRequirement, ZkConfig, ZkDcs};
use pgsentry_types::{HostId, ReplicaInfo};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pgsentryctl")]
#[command(author, version, about = "Operator CLI for a pgsentry cluster", long_about = None)]
struct Cli {
    /// Path to the pgsentry config file (same file `pgsentryd` reads).
    #[arg(short = 'c', long = "config", default_value = "/etc/pgsentry.conf")]
    config_file: String,

    /// Override the configured ZooKeeper connection string.
    #[arg(long)]
    zk: Option<String>,

    /// Override the configured ZooKeeper chroot prefix.
    #[arg(long = "zk-prefix")]
    zk_prefix: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Define the ZooKeeper member structure for a cluster's hosts.
    Initzk {
        /// Space-separated list of cluster member hostnames.
        #[arg(required = true)]
        members: Vec<String>,
        /// Check whether initialization already happened instead of performing it.
        #[arg(short, long)]
        test: bool,
    },

    /// Enable, disable, or show cluster maintenance mode.
    Maintenance {
        #[arg(short, long, value_enum, default_value = "enable")]
        mode: MaintenanceMode,
        /// Wait for all alive hosts to confirm the transition.
        #[arg(short, long)]
        wait_all: bool,
        #[arg(short, long, default_value_t = 300)]
        timeout: u64,
    },

    /// Show cluster information.
    Info {
        /// Short summary instead of the full DCS state dump.
        #[arg(short, long)]
        short: bool,
        /// Print as JSON instead of YAML.
        #[arg(short, long)]
        json: bool,
    },

    /// Perform a graceful, planned switchover of the current primary.
    Switchover {
        /// Host to switch the primary to; auto-selected if omitted.
        #[arg(short, long)]
        destination: Option<String>,
        /// Assert this host is the current primary before scheduling.
        #[arg(long)]
        primary: Option<String>,
        /// Pin the expected timeline instead of reading it from the DCS.
        #[arg(long)]
        timeline: Option<u32>,
        /// Poll until the switchover completes instead of returning immediately.
        #[arg(long)]
        block: bool,
        /// Don't prompt for confirmation before proceeding.
        #[arg(short = 'y', long)]
        yes: bool,
        /// Reset switchover state in the DCS instead of performing one.
        #[arg(short, long)]
        reset: bool,
        /// Require exactly this many HA replicas to be alive before proceeding.
        #[arg(long)]
        replicas: Option<usize>,
        /// How long `--block` polls for before giving up (seconds).
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },

    /// Operations on the failover state machine.
    Failover {
        /// Reset failover state in the DCS (potentially disruptive).
        #[arg(short, long)]
        reset: bool,
    },

    /// Reset every DCS node except the member list.
    ResetAll,
}

#[derive(Clone, Copy, ValueEnum)]
enum MaintenanceMode {
    Enable,
    Disable,
    Show,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new("warn").unwrap())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ConfigLoader::new().with_config_file(&cli.config_file).load().context("loading config")?;
    if let Some(zk) = cli.zk {
        config.global.zk_hosts = zk;
    }
    if let Some(prefix) = cli.zk_prefix {
        config.global.zk_lockpath_prefix = prefix;
    }

    // `initzk` and `reset-all` touch the whole tree and are run rarely
    // against a cluster that may be mid-incident; widen the ZK timeout the
    // way the original bumped `iteration_timeout` to 5s for the same two
    // commands, so a slow quorum doesn't make the operator retry blind.
    let widen_timeout = matches!(cli.command, Command::Initzk { .. } | Command::ResetAll);
    let session_timeout =
        if widen_timeout { Duration::from_secs(5) } else { config.global.zk_connect_max_delay };

    let zk_config = ZkConfig {
        hosts: config.global.zk_hosts.clone(),
        chroot: config.global.zk_lockpath_prefix.clone(),
        session_timeout,
        auth: None,
    };
    let dcs = ZkDcs::connect(&zk_config).await.context("connecting to zookeeper")?;

    match cli.command {
        Command::Initzk { members, test } => initzk(&dcs, &members, test).await,
        Command::Maintenance { mode, wait_all, timeout } => {
            maintenance(&dcs, mode, wait_all, Duration::from_secs(timeout)).await
        }
        Command::Info { short, json } => info(&dcs, short, json).await,
        Command::Switchover { destination, primary, timeline, block, yes, reset, replicas, timeout } => {
            switchover(&dcs, destination, primary, timeline, block, yes, reset, replicas, Duration::from_secs(timeout))
                .await
        }
        Command::Failover { reset } => failover(&dcs, reset).await,
        Command::ResetAll => reset_all(&dcs).await,
    }
}

async fn initzk(dcs: &ZkDcs, members: &[String], test: bool) -> Result<()> {
    for member in members {
        let path = paths::host_root(&HostId::new(member.clone()));
        if test {
            let exists = dcs.get(&path).await?.is_some() || !dcs.children(&path).await?.is_empty();
            if !exists {
                bail!("path \"{path}\" not found in ZK, initialization has not been performed earlier");
            }
        } else {
            dcs.ensure_path(&path).await.with_context(|| format!("could not create path \"{path}\""))?;
        }
    }
    if test {
        println!("initialization for all hosts has been performed earlier");
    } else {
        println!("ZK structures are initialized");
    }
    Ok(())
}

async fn maintenance(dcs: &ZkDcs, mode: MaintenanceMode, wait_all: bool, timeout: Duration) -> Result<()> {
    match mode {
        MaintenanceMode::Enable => {
            dcs.ensure_path(paths::MAINTENANCE).await?;
            dcs.set(paths::MAINTENANCE, "enable", LockRequirement::None).await?;
            if wait_all {
                if !await_all_hosts_confirm(dcs, "enable", timeout).await? {
                    dcs.set(paths::MAINTENANCE, "disable", LockRequirement::None).await.ok();
                    bail!("timed out waiting for all hosts to enter maintenance mode");
                }
                println!("Success");
            }
        }
        MaintenanceMode::Disable => {
            dcs.set(paths::MAINTENANCE, "disable", LockRequirement::None).await?;
            if wait_all {
                let deadline = Instant::now() + timeout;
                loop {
                    if dcs.get(paths::MAINTENANCE).await?.is_none() {
                        break;
                    }
                    if Instant::now() >= deadline {
                        dcs.set(paths::MAINTENANCE, "enable", LockRequirement::None).await.ok();
                        bail!("timed out waiting for all hosts to exit maintenance mode");
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                println!("Success");
            }
        }
        MaintenanceMode::Show => {
            let value = dcs.get(paths::MAINTENANCE).await?.unwrap_or_else(|| "disable".to_string());
            println!("{value}d");
        }
    }
    Ok(())
}

/// Polls until every alive host has written `maintenance/{host} = enable`
/// under its own name, matching `cli.py::maintenance_enabled`.
async fn await_all_hosts_confirm(dcs: &ZkDcs, value: &str, timeout: Duration) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        let alive = dcs.children(paths::ALIVE_ROOT).await?;
        let all_confirmed = all_hosts_confirmed(dcs, &alive, value).await?;
        if all_confirmed {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn all_hosts_confirmed(dcs: &ZkDcs, hosts: &[String], value: &str) -> Result<bool> {
    for host in hosts {
        let path = paths::host_maintenance(&HostId::new(host.clone()));
        if dcs.get(&path).await?.as_deref() != Some(value) {
            return Ok(false);
        }
    }
    Ok(true)
}

async fn info(dcs: &ZkDcs, short: bool, as_json: bool) -> Result<()> {
    let alive = dcs.children(paths::ALIVE_ROOT).await?;
    let primary = dcs.current_lock_holder(paths::PRIMARY_LOCK).await?;
    let last_failover_time = dcs.get(paths::LAST_FAILOVER_TIME).await?;
    let maintenance = dcs.get(paths::MAINTENANCE).await?;
    let replics_info: Option<Vec<ReplicaInfo>> = dcs.get_json(paths::REPLICS_INFO).await?;

    let value = if short {
        let short_replics: serde_json::Map<String, serde_json::Value> = replics_info
            .unwrap_or_default()
            .into_iter()
            .map(|r| {
                let summary =
                    format!("{}, sync_state {:?}", r.state, r.sync_state);
                (r.application_name, json!(summary))
            })
            .collect();
        json!({
            "alive": alive,
            "primary": primary.map(|h| h.0),
            "last_failover_time": last_failover_time,
            "maintenance": maintenance,
            "replics_info": short_replics,
        })
    } else {
        json!({
            "alive": alive,
            "primary": primary.map(|h| h.0),
            "last_failover_time": last_failover_time,
            "maintenance": maintenance,
            "replics_info": replics_info,
        })
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", serde_yaml::to_string(&value)?);
    }
    Ok(())
}

/// Scheduled-switchover requests are dropped by writing the operator's
/// intent to `switchover/master`; the primary's own control loop drives the
/// handover state machine from there (spec §4.6). With `--block`, this
/// polls `switchover/state` until the primary clears it (success) or marks
/// it `failed`, exiting 2 on either failure or timeout (spec §6, §8
/// scenario 2).
#[allow(clippy::too_many_arguments)]
async fn switchover(
    dcs: &ZkDcs,
    destination: Option<String>,
    expected_primary: Option<String>,
    expected_timeline: Option<u32>,
    block: bool,
    yes: bool,
    reset: bool,
    expected_replicas: Option<usize>,
    timeout: Duration,
) -> Result<()> {
    if reset {
        dcs.delete(paths::SWITCHOVER_ROOT, true).await?;
        dcs.delete(paths::FAILOVER_STATE, false).await.ok();
        println!("switchover state reset");
        return Ok(());
    }

    let primary = dcs
        .current_lock_holder(paths::PRIMARY_LOCK)
        .await?
        .context("cluster has no current primary, cannot plan a switchover")?;
    if let Some(expected) = &expected_primary {
        if primary.as_str() != expected {
            bail!("current primary is {primary}, not the expected {expected}");
        }
    }
    if let Some(expected) = expected_replicas {
        let alive_replicas =
            dcs.children(paths::ALIVE_ROOT).await?.iter().filter(|h| h.as_str() != primary.as_str()).count();
        if alive_replicas != expected {
            bail!("expected {expected} alive replicas, found {alive_replicas}");
        }
    }

    let timeline = match expected_timeline {
        Some(t) => pgsentry_types::Timeline(t),
        None => {
            dcs.get(paths::TIMELINE).await?.and_then(|v| v.parse().ok()).unwrap_or(pgsentry_types::Timeline(0))
        }
    };

    println!(
        "switchover {} (timeline: {}) to {}",
        primary,
        timeline,
        destination.as_deref().unwrap_or("<auto-selected sync replica>")
    );
    if !yes && !dialoguer::Confirm::new().with_prompt("proceed?").default(false).interact()? {
        println!("aborted");
        return Ok(());
    }

    let intent = pgsentry_types::SwitchoverIntent { hostname: primary, timeline, destination: destination.map(HostId::new) };
    dcs.ensure_path(paths::SWITCHOVER_ROOT).await?;
    dcs.set_json(paths::SWITCHOVER_MASTER, &intent, LockRequirement::None).await?;
    dcs.set(paths::SWITCHOVER_STATE, &pgsentry_types::SwitchoverState::Scheduled.to_string(), LockRequirement::None)
        .await
        .ok();
    println!("switchover scheduled");

    if !block {
        println!("the agent on the current primary will drive it through");
        return Ok(());
    }
    await_switchover_done(dcs, timeout).await
}

/// Polls until `switchover/state` is cleared (spec §4.6 step 5: the former
/// primary deletes `switchover/*` once the handover is done) or becomes
/// `failed`. Exits the process with code 2 on either failure or timeout,
/// matching the exit-code contract in spec §6.
async fn await_switchover_done(dcs: &ZkDcs, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match dcs.get(paths::SWITCHOVER_STATE).await? {
            None => {
                println!("switchover complete");
                return Ok(());
            }
            Some(state) if state == pgsentry_types::SwitchoverState::Failed.to_string() => {
                eprintln!("switchover failed");
                std::process::exit(2);
            }
            _ => {}
        }
        if Instant::now() >= deadline {
            eprintln!("timed out waiting for switchover to complete");
            std::process::exit(2);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn failover(dcs: &ZkDcs, reset: bool) -> Result<()> {
    if reset {
        dcs.delete(paths::FAILOVER_STATE, false).await?;
        dcs.delete(paths::CURRENT_PROMOTING_HOST, false).await?;
        println!("failover state reset");
    }
    Ok(())
}

async fn reset_all(dcs: &ZkDcs) -> Result<()> {
    for node in dcs.children("").await? {
        if node == paths::ALL_HOSTS {
            continue;
        }
        dcs.delete(&node, true).await.with_context(|| format!("could not reset node \"{node}\""))?;
    }
    println!("ZK structures are reset");
    Ok(())
}
