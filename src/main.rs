use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use travelmap::models::travel::{bounds, center, import_points, segments};
use travelmap::{GeocodeResolver, TravelMapConfig, TravelMapError, logging, web};

#[derive(Parser)]
#[command(name = "travelmap", version, about = "Geocode cities for travel trajectories")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "TRAVELMAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP geocoding proxy
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Resolve a single city
    Resolve {
        city: String,
        /// Skip both caches
        #[arg(long)]
        refresh: bool,
    },
    /// Resolve every stop of an exported trip file
    Batch { trip: PathBuf },
    /// Inspect or clean the persistent cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    Stats,
    Sweep,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        match e.downcast_ref::<TravelMapError>() {
            Some(app_error) => eprintln!("Error: {}", app_error.user_message()),
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = TravelMapConfig::load_from_path(cli.config)?;
    logging::init(&config.logging)?;

    let resolver = Arc::new(GeocodeResolver::from_config(&config)?);

    match cli.command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            web::run(resolver, &config.server, &config.cache).await?;
        }
        Command::Resolve { city, refresh } => {
            let result = resolver.resolve(&city, refresh).await;
            println!(
                "{}: {} ({})",
                city,
                result.coordinate.format_coordinates(),
                result.source
            );
            if let Some(address) = result.address.and_then(|a| a.formatted_address) {
                println!("  {address}");
            }
        }
        Command::Batch { trip } => {
            let json = std::fs::read_to_string(&trip)
                .with_context(|| format!("Failed to read {}", trip.display()))?;
            let points = import_points(&json)?;
            let trajectory = resolver.resolve_trip(points).await;

            for point in &trajectory {
                if let Some(location) = &point.location {
                    println!(
                        "{:<12} {:<20} {} ({})",
                        point.point.date,
                        point.point.city,
                        location.coordinate.format_coordinates(),
                        location.source
                    );
                }
            }

            let legs = segments(&trajectory);
            if !legs.is_empty() {
                println!();
                let mut total = 0.0;
                for leg in &legs {
                    total += leg.distance_km;
                    println!(
                        "{} -> {}: {:.1} km {}",
                        leg.from,
                        leg.to,
                        leg.distance_km,
                        leg.transport.join("/")
                    );
                }
                println!("Total: {total:.1} km");
            }

            let coordinates: Vec<_> = trajectory
                .iter()
                .filter_map(|p| p.location.as_ref().map(|l| l.coordinate))
                .collect();
            let view = bounds(&coordinates);
            println!(
                "Center {} bounds N{:.2} S{:.2} E{:.2} W{:.2}",
                center(&coordinates).format_coordinates(),
                view.north,
                view.south,
                view.east,
                view.west
            );
        }
        Command::Cache { .. } if !resolver.cache_available() => {
            return Err(TravelMapError::cache(format!(
                "could not open {}",
                config.cache.location
            ))
            .into());
        }
        Command::Cache { action } => match action {
            CacheAction::Stats => {
                let stats = resolver.cache_stats();
                println!(
                    "{} entries ({} valid, {} expired), ~{} bytes",
                    stats.total, stats.valid, stats.expired, stats.approx_size_bytes
                );
            }
            CacheAction::Sweep => {
                println!("Removed {} expired entries", resolver.sweep_expired());
            }
        },
    }

    Ok(())
}
