use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shardwire::config::{Config, ConfigError};
use shardwire::routing::{extract_tag, slot};
use shardwire::{
    ClusterRouter, ClusterTopology, Dispatcher, FailoverCoordinator, HashRing, KeyRouter, ShardedRouter,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shardwire")]
#[command(about = "Routing and connection diagnostics for sharded and clustered key-value stores")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which shard or node serves each key
    Route {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Keys to route
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Show the hash tag and cluster slot of each key
    Slot {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Connect to the configured servers and report their state
    Probe {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Follow the master of the configured failover group until interrupted
    Watch {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Generate example configuration files
    Config {
        /// Configuration mode (sharded, cluster or failover)
        #[arg(short, long)]
        mode: String,
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Route { config, keys } => route_keys(config, keys).await,
        Commands::Slot { keys } => {
            show_slots(&keys);
            Ok(())
        }
        Commands::Probe { config } => probe(config).await,
        Commands::Watch { config } => watch_master(config).await,
        Commands::Config { mode, output } => generate_config(mode, output),
        Commands::Validate { config } => validate_config(config),
        Commands::Version => {
            show_version();
            Ok(())
        }
    }
}

fn load(config_path: &PathBuf) -> Result<Config> {
    let config = Config::load_from_file(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    init_logging(&config)?;
    info!("Configuration loaded from: {:?}", config_path);
    Ok(config)
}

async fn route_keys(config_path: PathBuf, keys: Vec<String>) -> Result<()> {
    let config = load(&config_path)?;

    if !config.shards.is_empty() {
        let ring = HashRing::build(&config.shard_descriptors(), config.hashing.algorithm);
        println!(
            "Sharded ({}, {} shards, {} ring points)",
            config.hashing.algorithm,
            ring.shards().len(),
            ring.len()
        );
        for key in &keys {
            let tag = extract_tag(key.as_bytes());
            match ring.resolve(tag) {
                Some(shard) => println!("  {} -> {} (hash {:#x})", key, shard, ring.hash(tag)),
                None => println!("  {} -> no shard", key),
            }
        }
    }

    if let Some(cluster) = &config.cluster {
        let pools = config.connection_pools();
        let topology = Arc::new(ClusterTopology::new(cluster.seed_endpoints()?));
        topology
            .discover(&pools, pools.default_wait())
            .await
            .context("Cluster topology discovery failed")?;
        let router = ClusterRouter::new(topology);
        println!("Cluster");
        for key in &keys {
            match router.resolve(key.as_bytes()) {
                Ok(endpoint) => println!("  {} -> slot {} on {}", key, slot(key.as_bytes()), endpoint),
                Err(e) => println!("  {} -> slot {}: {}", key, slot(key.as_bytes()), e),
            }
        }
        pools.shutdown().await;
    }

    Ok(())
}

fn show_slots(keys: &[String]) {
    for key in keys {
        let tag = extract_tag(key.as_bytes());
        println!(
            "{} tag={} slot={}",
            key,
            String::from_utf8_lossy(tag),
            slot(key.as_bytes())
        );
    }
}

async fn probe(config_path: PathBuf) -> Result<()> {
    let config = load(&config_path)?;
    let pools = Arc::new(config.connection_pools());

    if !config.shards.is_empty() {
        let router = Arc::new(ShardedRouter::new(&config.shard_descriptors(), config.hashing.algorithm));
        let dispatcher = Dispatcher::new(router, pools.clone());
        println!("Shards");
        for (endpoint, reply) in dispatcher.broadcast(&["PING"]).await {
            match reply {
                Ok(reply) => println!("  {}: {}", endpoint, reply),
                Err(e) => println!("  {}: {}", endpoint, e),
            }
        }
    }

    if let Some(cluster) = &config.cluster {
        let topology = ClusterTopology::new(cluster.seed_endpoints()?);
        let table = topology.discover(&pools, pools.default_wait()).await?;
        let coverage = table.coverage();
        println!(
            "Cluster: {}/{} slots assigned ({:.1}%)",
            coverage.assigned_slots, coverage.total_slots, coverage.coverage_percentage
        );
        for (endpoint, slots) in &coverage.distribution {
            println!("  {}: {} slots", endpoint, slots);
        }
    }

    if let Some(failover) = &config.failover {
        let coordinator = FailoverCoordinator::new(
            failover.group.clone(),
            failover.member_endpoints()?,
            pools.clone(),
            failover.probe_wait(),
        );
        println!("Failover group [{}]", failover.group);
        for member in coordinator.members() {
            match coordinator.probe(member).await {
                Ok(role) => println!("  {}: {}", member, role),
                Err(e) => println!("  {}: {}", member, e),
            }
        }
        match coordinator.elect_master().await {
            Ok(master) => println!("  master: {}", master),
            Err(e) => println!("  master: {}", e),
        }
    }

    pools.shutdown().await;
    Ok(())
}

async fn watch_master(config_path: PathBuf) -> Result<()> {
    let config = load(&config_path)?;
    let Some(failover) = &config.failover else {
        bail!("No [failover] section in {:?}", config_path);
    };

    let pools = Arc::new(config.connection_pools());
    let coordinator = Arc::new(FailoverCoordinator::new(
        failover.group.clone(),
        failover.member_endpoints()?,
        pools.clone(),
        failover.probe_wait(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = coordinator.spawn_monitor(failover.check_interval(), shutdown_rx);

    info!(
        "Watching group [{}] every {}ms, press Ctrl-C to stop",
        failover.group, failover.check_interval_millis
    );
    let mut ticker = tokio::time::interval(failover.check_interval());
    let mut last = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let master = coordinator.current_master();
                if master != last {
                    match &master {
                        Some(endpoint) => println!("[{}] master: {}", failover.group, endpoint),
                        None => println!("[{}] no master", failover.group),
                    }
                    last = master;
                }
            }
        }
    }

    info!("Shutting down");
    if shutdown_tx.send(true).is_err() {
        debug!("Master monitor already stopped");
    }
    monitor.await.context("Master monitor panicked")?;
    pools.shutdown().await;
    Ok(())
}

fn generate_config(mode: String, output: PathBuf) -> Result<()> {
    println!("Generating {} configuration file: {:?}", mode, output);

    Config::create_example_config(&output, &mode).context("Failed to generate config")?;

    println!("Configuration file generated successfully!");
    println!("Edit the file to match your environment and run:");
    println!("  shardwire probe --config {:?}", output);

    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    println!("Validating configuration file: {:?}", config_path);

    match Config::load_from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid");
            println!("  Hashing: {}", config.hashing.algorithm);
            println!(
                "  Pool: {} connections, {} repair workers per endpoint",
                config.pool.resources_number, config.pool.repair_threads_number
            );
            if !config.shards.is_empty() {
                println!("  Shards: {}", config.shards.len());
                for (i, shard) in config.shard_descriptors().iter().enumerate() {
                    println!("    {}: {}", i + 1, shard);
                }
            }
            if let Some(cluster) = &config.cluster {
                println!("  Cluster seeds: {}", cluster.seeds.join(", "));
            }
            if let Some(failover) = &config.failover {
                println!("  Failover group [{}]: {}", failover.group, failover.members.join(", "));
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration file validation failed:");
            match &e {
                ConfigError::IoError(msg) => eprintln!("  File error: {}", msg),
                ConfigError::ParseError(msg) => eprintln!("  Parse error: {}", msg),
                ConfigError::ValidationError(msg) => eprintln!("  Validation error: {}", msg),
                ConfigError::SerializeError(msg) => eprintln!("  Serialization error: {}", msg),
            }
            bail!(e)
        }
    }
}

fn show_version() {
    println!("shardwire v{}", env!("CARGO_PKG_VERSION"));
    println!("Routing, pooling and framing core for sharded and clustered key-value stores");
    println!();
    println!("Target: {}", std::env::consts::ARCH);
    println!();
    println!("Features:");
    println!("  • Consistent hashing with plain and Ketama rings");
    println!("  • Cluster slot routing with MOVED/ASK handling");
    println!("  • Master election and replication reset for replicated groups");
    println!("  • Per-endpoint connection pools with background repair");
}

fn init_logging(config: &Config) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let result = if config.logging.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))?;

    info!("Logging initialized at level: {}", config.logging.level);
    Ok(())
}
