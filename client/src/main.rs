use clap::Parser;
use client::network::{Client, ClientOptions};
use log::info;
use shared::{Color, GameMode};

fn parse_mode(s: &str) -> Result<GameMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "ffa" => Ok(GameMode::FreeForAll),
        "teams" => Ok(GameMode::Teams),
        "ctf" => Ok(GameMode::CaptureTheFlag),
        other => Err(format!("unknown mode `{}` (expected ffa, teams or ctf)", other)),
    }
}

fn parse_color(s: &str) -> Result<Color, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("bad colour component: {}", e))?;
    match parts.as_slice() {
        [r, g, b, a] => Ok(Color::rgba(*r, *g, *b, *a)),
        _ => Err("expected four components: r,g,b,a".to_string()),
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Game mode to vote for: ffa, teams or ctf
    #[arg(short = 'm', long, default_value = "ffa", value_parser = parse_mode)]
    mode: GameMode,

    /// Player colour as r,g,b,a; all zeros lets the server pick
    #[arg(short = 'c', long, default_value = "0,0,0,0", value_parser = parse_color)]
    color: Color,

    /// Drive the player with random input
    #[arg(short = 'b', long)]
    bot: bool,

    /// Seed for the bot's input
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let mut client = Client::new(ClientOptions {
        server: args.server,
        fake_ping_ms: args.fake_ping,
        mode: args.mode,
        color: args.color,
        bot: args.bot,
        seed: args.seed,
    })
    .await?;

    client.run().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("CTF"), Ok(GameMode::CaptureTheFlag));
        assert!(parse_mode("deathmatch").is_err());
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("1, 0.5, 0, 1"), Ok(Color::rgba(1.0, 0.5, 0.0, 1.0)));
        assert!(parse_color("1,0,0").is_err());
        assert!(parse_color("red,0,0,1").is_err());
    }
}
