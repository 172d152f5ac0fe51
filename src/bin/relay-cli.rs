use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Operator CLI for the AIS relay", long_about = None)]
struct Cli {
    /// Base URL of the relay's HTTP listener.
    #[arg(short, long, default_value = "http://localhost:10000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show subscriber count, upstream state and message counter
    Health,
    /// Subscribe to the relay and print events as they arrive
    Watch {
        /// Stop after this many events
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = reqwest::get(format!("{}/health", base)).await?;
            print_response(res).await?;
        }
        Commands::Watch { limit } => {
            let ws_url = websocket_url(base);
            let (mut stream, _) = tokio_tungstenite::connect_async(ws_url.as_str()).await?;
            eprintln!("Subscribed to {}", ws_url);

            let mut seen = 0usize;
            while let Some(message) = stream.next().await {
                match message? {
                    Message::Text(text) => {
                        println!("{}", text.as_str());
                        seen += 1;
                    }
                    Message::Close(frame) => {
                        eprintln!("Relay closed the connection: {:?}", frame);
                        break;
                    }
                    _ => continue,
                }
                if limit.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn websocket_url(base: &str) -> String {
    if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}/ws", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}/ws", rest)
    } else {
        format!("{}/ws", base)
    }
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let json: Value = res.json().await?;
    if !status.is_success() {
        eprintln!("Error: relay reported status {}", status);
    }
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
