use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};
use shared::DEFAULT_EXPECTED_PLAYERS;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "60000")]
    port: u16,

    /// Number of players needed to start the game
    #[arg(short = 'n', long, default_value_t = DEFAULT_EXPECTED_PLAYERS)]
    players: usize,

    /// Seed for random heals and attacks
    #[arg(short, long)]
    seed: Option<u64>,
}

/// Forwards stdin lines to the server loop until stdin closes.
fn spawn_console(console_tx: mpsc::UnboundedSender<String>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if console_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read console input: {}", e);
                    break;
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.players == 0 {
        return Err("at least one player is required".into());
    }

    let config = ServerConfig {
        expected_players: args.players,
        seed: args.seed,
    };
    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::bind(&address, config).await?;
    info!("Type a line to broadcast it, '.quit' to stop");

    let (console_tx, console_rx) = mpsc::unbounded_channel();
    spawn_console(console_tx);

    tokio::select! {
        result = server.run(console_rx) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
