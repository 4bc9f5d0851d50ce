use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use shared::SceneLayout;
use std::time::Duration;

/// Authority server for the arena: owns every replicated entity and
/// executes observer requests.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[clap(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of connected observers
    #[clap(short, long, default_value = "16")]
    max_clients: usize,

    /// Fixed RNG seed for reproducible sessions
    #[clap(long)]
    seed: Option<u64>,

    /// Seconds between power-up drops
    #[clap(long, default_value = "15")]
    powerup_interval: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let tick_rate = args.tick_rate.max(1);

    let config = ServerConfig {
        tick_duration: Duration::from_secs_f64(1.0 / tick_rate as f64),
        max_clients: args.max_clients,
        seed: args.seed,
        powerup_interval: args.powerup_interval,
        ..ServerConfig::default()
    };

    let addr = format!("{}:{}", args.host, args.port);
    info!(
        "Starting server on {} at {} Hz (max {} clients)",
        addr, tick_rate, args.max_clients
    );

    let mut server = Server::new(&addr, config, SceneLayout::default()).await?;
    server.run().await?;

    Ok(())
}
