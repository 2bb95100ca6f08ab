use clap::Parser;
use client::network::Client;
use log::{error, info};
use shared::MAX_NAME_LEN;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:60000")]
    server: String,

    /// Player name; asked for on startup when missing
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Local port to connect from
    #[arg(short = 'l', long)]
    local_port: Option<u16>,
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LEN && !name.contains(char::is_whitespace)
}

async fn prompt_name(
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<String, Box<dyn std::error::Error>> {
    loop {
        print!("Enter name: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            return Err("stdin closed before a name was entered".into());
        };
        let name = line.trim();
        if valid_name(name) {
            return Ok(name.to_string());
        }
        println!(
            "Names are a single word of at most {} characters.",
            MAX_NAME_LEN
        );
    }
}

/// Forwards the remaining stdin lines to the client loop.
fn spawn_input(mut lines: Lines<BufReader<Stdin>>, line_tx: mpsc::UnboundedSender<String>) {
    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let name = match args.name {
        Some(name) if valid_name(&name) => name,
        Some(name) => {
            println!("'{}' is not a valid name.", name);
            prompt_name(&mut lines).await?
        }
        None => prompt_name(&mut lines).await?,
    };

    info!("Starting client as {}", name);
    let mut client = Client::new(&args.server, args.local_port, &name).await?;
    println!("Connection accepted!");

    let (line_tx, line_rx) = mpsc::unbounded_channel();
    spawn_input(lines, line_tx);

    client.run(line_rx).await?;

    Ok(())
}
