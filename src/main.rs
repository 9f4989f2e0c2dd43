use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;
use tokio::time::timeout;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use taskreaper::buffer::{derive_capacities, validate_capacities};
use taskreaper::clock::Clock;
use taskreaper::config::Config;
use taskreaper::driver::DriverHolder;
use taskreaper::event_bus::EventBus;
use taskreaper::kill_service::KillService;
use taskreaper::sim::{lost_instance, running_instance, SimCluster, SimDriver, SimStateOps};
use taskreaper::types::TaskId;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env if present (for kill options, fleet shape).
    let _ = dotenv();

    init_tracing();

    let cfg_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = Config::load(cfg_path)?;
    info!("starting taskreaper smoke run with config {:?}", cfg);

    let caps = derive_capacities(cfg.kill_chunk_size);
    validate_capacities(&caps).map_err(|err| anyhow::anyhow!("bad channel capacities: {err}"))?;
    info!(
        "channel capacities: mailbox={} bus_events={}",
        caps.mailbox, caps.bus_events
    );

    let fleet_size = env_u64("FLEET_SIZE", 12) as usize;
    let tasks_per_instance = env_u64("TASKS_PER_INSTANCE", 2) as usize;
    let lost_instances = env_u64("LOST_INSTANCES", 2) as usize;
    let drop_every = match env_u64("DROP_EVERY", 4) {
        0 => None,
        n => Some(n),
    };
    let deadline = Duration::from_secs(env_u64("SMOKE_DEADLINE_SECS", 60));

    let bus = EventBus::new(caps.bus_events);
    let cluster = SimCluster::new(bus.clone());

    let mut fleet = Vec::new();
    for n in 0..fleet_size {
        let instance = running_instance(&format!("web_{n}"), tasks_per_instance);
        cluster.register(instance.clone());
        fleet.push(instance);
    }
    for n in 0..lost_instances {
        // Lost instances are part of authoritative state but unreachable;
        // they must go through force-expunge rather than the driver.
        let instance = lost_instance(&format!("stray_{n}"));
        cluster.register(instance.clone());
        fleet.push(instance);
    }
    info!(
        fleet = fleet.len(),
        lost = lost_instances,
        drop_every = ?drop_every,
        "registered simulated fleet"
    );

    let sim_driver = Arc::new(SimDriver::new(cluster.clone(), drop_every));
    let driver = DriverHolder::new();
    driver.attach(sim_driver.clone());
    let state_ops = Arc::new(SimStateOps::new(cluster.clone()));

    let service = KillService::spawn(
        cfg.kill_policy(),
        bus.clone(),
        driver.clone(),
        state_ops,
        Clock::system(),
    );

    let completion = service.kill_instances(fleet).await;
    // One task the orchestrator has no snapshot for, as happens after a
    // leader failover.
    service
        .kill_unknown_task(TaskId::new("ghost_0", "ghost_0.task-0"))
        .await;

    let resolved = match timeout(deadline, completion.wait()).await {
        Ok(resolved) => resolved,
        Err(_) => {
            warn!("fleet did not reach terminal state within {:?}", deadline);
            false
        }
    };

    let stats = service.stats().await;
    let counts = service.counts();
    info!(
        resolved,
        pending = stats.pending,
        in_flight = stats.in_flight,
        remaining_instances = cluster.len(),
        driver_kills = counts.driver_kills,
        dropped_by_driver = sim_driver.kills_dropped(),
        retries = counts.retries,
        expunges = counts.expunges,
        terminal_events = counts.terminal_events,
        "smoke run finished"
    );

    service.shutdown().await;

    if !resolved {
        anyhow::bail!("smoke run did not converge");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .init();
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
