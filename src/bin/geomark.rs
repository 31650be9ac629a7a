use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use geomark::{refresh, server, DatasetStore, GeoDataset, GeoError};

#[derive(Parser)]
#[command(name = "geomark")]
#[command(
    about = "Annotate IP addresses with geographic metadata from GeoLite2 CSV exports",
    long_about = "geomark - IP-to-geography annotation engine\n\n\
    Builds an in-memory range index from the GeoLite2-City CSV exports\n\
    (plain or gzip-compressed) and answers point lookups against it,\n\
    either one-shot from the command line or as an HTTP service with\n\
    periodic dataset refresh.\n\n\
    Examples:\n\
      geomark query ./geolite2 8.8.8.8 2606:4700::1111\n\
      geomark serve ./geolite2 --listen 0.0.0.0:8080 --watch\n\
      geomark inspect ./geolite2 --json"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate one or more IP addresses against a dataset directory
    Query {
        /// Directory holding the GeoLite2-City CSV files
        #[arg(value_name = "DATA_DIR")]
        data_dir: PathBuf,

        /// IP addresses to annotate
        #[arg(value_name = "IP", required = true)]
        ips: Vec<String>,

        /// Output one JSON object per address (NDJSON)
        #[arg(long)]
        json: bool,
    },

    /// Serve the HTTP annotation API with periodic dataset refresh
    Serve {
        /// Directory holding the GeoLite2-City CSV files
        #[arg(value_name = "DATA_DIR")]
        data_dir: PathBuf,

        /// Listen address for the HTTP server
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        listen: String,

        /// Seconds between dataset refreshes
        #[arg(long, default_value = "86400")]
        refresh_secs: u64,

        /// Also refresh when the dataset directory changes on disk
        #[arg(short, long)]
        watch: bool,
    },

    /// Load a dataset directory and print index statistics
    Inspect {
        /// Directory holding the GeoLite2-City CSV files
        #[arg(value_name = "DATA_DIR")]
        data_dir: PathBuf,

        /// Output statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Query {
            data_dir,
            ips,
            json,
        } => cmd_query(data_dir, ips, json),
        Commands::Serve {
            data_dir,
            listen,
            refresh_secs,
            watch,
        } => cmd_serve(data_dir, listen, refresh_secs, watch),
        Commands::Inspect { data_dir, json } => cmd_inspect(data_dir, json),
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_dataset(data_dir: &Path) -> Result<GeoDataset> {
    GeoDataset::load_dir(data_dir)
        .with_context(|| format!("failed to load dataset from {}", data_dir.display()))
}

fn cmd_query(data_dir: PathBuf, ips: Vec<String>, json: bool) -> Result<()> {
    let dataset = load_dataset(&data_dir)?;

    let mut failures = 0usize;
    for ip in &ips {
        match dataset.annotate(ip) {
            Ok(metadata) => {
                if json {
                    let mut line = serde_json::to_value(&metadata)?;
                    line["ip"] = serde_json::Value::String(ip.clone());
                    println!("{}", line);
                } else {
                    println!(
                        "{}: {} {} {} ({}, {})",
                        ip,
                        metadata.country_code,
                        metadata.city_name,
                        metadata.postal_code,
                        metadata.latitude,
                        metadata.longitude
                    );
                }
            }
            Err(err @ GeoError::InvalidQueryIp(_)) => {
                eprintln!("{}: {}", ip, err);
                failures += 1;
            }
            Err(GeoError::NotFound) => {
                if json {
                    println!("{}", serde_json::json!({ "ip": ip, "error": "not found" }));
                } else {
                    println!("{}: not found", ip);
                }
                failures += 1;
            }
            Err(err) => return Err(err).context("lookup failed"),
        }
    }

    if failures > 0 {
        // Same convention as a missed grep: nonzero when not everything matched.
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_serve(data_dir: PathBuf, listen: String, refresh_secs: u64, watch: bool) -> Result<()> {
    let store = Arc::new(DatasetStore::new());
    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    let (kick_tx, kick_rx) = crossbeam_channel::unbounded();

    // Keeps the watcher alive for the lifetime of the server.
    let _watcher = if watch {
        Some(spawn_watcher(&data_dir, kick_tx)?)
    } else {
        None
    };

    // The refresher performs the initial load; the server starts serving
    // 503s immediately and flips to data as soon as the load lands.
    let refresher = refresh::spawn(
        Arc::clone(&store),
        data_dir,
        Duration::from_secs(refresh_secs),
        stop_rx,
        kick_rx,
    );

    let result = actix_web::rt::System::new()
        .block_on(server::run(store, &listen))
        .with_context(|| format!("HTTP server failed on {}", listen));

    stop_tx.send(()).ok();
    if refresher.join().is_err() {
        eprintln!("[WARN] refresher thread panicked");
    }
    result
}

fn spawn_watcher(
    data_dir: &Path,
    kick_tx: crossbeam_channel::Sender<()>,
) -> Result<notify::RecommendedWatcher> {
    use notify::{Event, EventKind, RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        match event {
            Ok(event) => {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    kick_tx.send(()).ok();
                }
            }
            Err(err) => {
                eprintln!("[WARN] dataset watcher error: {}", err);
            }
        }
    })
    .context("failed to create dataset watcher")?;

    watcher
        .watch(data_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", data_dir.display()))?;

    Ok(watcher)
}

fn cmd_inspect(data_dir: PathBuf, json: bool) -> Result<()> {
    let dataset = load_dataset(&data_dir)?;

    let located_v4 = dataset.ip4.iter().filter(|n| n.location.is_some()).count();
    let located_v6 = dataset.ip6.iter().filter(|n| n.location.is_some()).count();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ip4_ranges": dataset.ip4.len(),
                "ip4_ranges_located": located_v4,
                "ip6_ranges": dataset.ip6.len(),
                "ip6_ranges_located": located_v6,
                "locations": dataset.locations.len(),
            })
        );
    } else {
        println!("Dataset: {}", data_dir.display());
        println!(
            "  IPv4 ranges: {} ({} with a location)",
            dataset.ip4.len(),
            located_v4
        );
        println!(
            "  IPv6 ranges: {} ({} with a location)",
            dataset.ip6.len(),
            located_v6
        );
        println!("  Locations:   {}", dataset.locations.len());
        if let (Some(first), Some(last)) = (dataset.ip4.first(), dataset.ip4.last()) {
            println!("  IPv4 span:   {} - {}", first.low, last.high);
        }
        if let (Some(first), Some(last)) = (dataset.ip6.first(), dataset.ip6.last()) {
            println!("  IPv6 span:   {} - {}", first.low, last.high);
        }
    }
    Ok(())
}
