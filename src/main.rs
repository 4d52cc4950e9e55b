use clap::{Parser, Subcommand};
use souq_locator::config::AppConfig;
use souq_locator::error::AppError;
use souq_locator::location::{
    AddressResolver, Coordinate, FileAddressCache, Gazetteer, IpDevice, LocationAcquirer, LocationService,
    NoDevice, Profile, ProfileName, ProxyGeocoder,
};
use souq_locator::{server, telemetry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Souq Locator: find where a listing is, and say it the way people read it.
///
/// Examples:
///   souq-locate serve --port 8080
///   souq-locate resolve --lat 32.8872 --lon 13.1913
///   souq-locate locate --profile precise
///   souq-locate places
#[derive(Parser)]
#[command(name = "souq-locate", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reverse-geocoding proxy and location API.
    Serve {
        /// Bind address override (APP_HOST).
        #[arg(long)]
        host: Option<String>,

        /// Port override (APP_PORT).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Turn a coordinate (e.g. a map pin) into a display address.
    Resolve {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Offline mode: skip the cache and the proxy.
        #[arg(long)]
        offline: bool,
    },

    /// Locate this machine by IP and resolve its address.
    Locate {
        #[arg(long, default_value = "fast", value_parser = parse_profile)]
        profile: ProfileName,

        #[arg(long)]
        offline: bool,
    },

    /// Print the built-in (or configured) gazetteer.
    Places,
}

fn parse_profile(s: &str) -> Result<ProfileName, String> {
    s.parse()
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let gazetteer = match &config.locator.gazetteer_path {
        Some(path) => Arc::new(Gazetteer::load_from(path)?),
        None => Gazetteer::builtin(),
    };

    match cli.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let addr = config.server.socket_addr()?;
            let state = Arc::new(server::AppState::from_config(&config.locator, gazetteer));
            server::start(addr, state).await?;
        }

        Command::Resolve { lat, lon, offline } => {
            let coordinate = Coordinate::new(lat, lon)?;
            let service = LocationService::new(
                LocationAcquirer::new(Arc::new(NoDevice)),
                client_resolver(&config, gazetteer, offline),
            );

            let resolved = service.resolve_manual(coordinate).await;
            eprintln!("  {}", resolved.display_line());
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }

        Command::Locate { profile, offline } => {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let progress = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if let Ok(line) = serde_json::to_string(&event) {
                        eprintln!("  \u{2026} {}", line);
                    }
                }
            });

            let service = LocationService::new(
                LocationAcquirer::new(Arc::new(IpDevice::new())),
                client_resolver(&config, gazetteer, offline),
            )
            .with_progress(tx);

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let outcome = service.acquire(Profile::named(profile), &cancel).await;
            drop(service);
            let _ = progress.await;

            match outcome {
                Ok(resolved) => {
                    eprintln!("  {}", resolved.display_line());
                    if let Some(caveat) = resolved.caveat() {
                        eprintln!("  \u{26A0}\u{FE0F}  {}", caveat);
                    }
                    println!("{}", serde_json::to_string_pretty(&resolved)?);
                }
                Err(e) => {
                    eprintln!("Error: {}", e.user_message());
                    std::process::exit(1);
                }
            }
        }

        Command::Places => {
            println!("{}", serde_json::to_string_pretty(gazetteer.places())?);
        }
    }

    Ok(())
}

/// Client-side resolver: talks to the trusted proxy, never the upstream.
fn client_resolver(config: &AppConfig, gazetteer: Arc<Gazetteer>, offline: bool) -> AddressResolver {
    let locator = &config.locator;
    let geocoder = Arc::new(ProxyGeocoder::new(locator.proxy_url.clone(), locator.geocode_timeout));
    let cache = Arc::new(FileAddressCache::load_from(locator.cache_path.clone()).with_ttl(locator.cache_ttl));

    let mut resolver = AddressResolver::new(gazetteer, geocoder, locator.resolver_config()).with_cache(cache);
    if offline {
        resolver.set_offline(true);
    }
    resolver
}
