//! CLI for chatrelay
//!
//! Subcommands:
//! - `server`: run the relay (WebSocket + HTTP listeners, hub, log consumer)
//! - `client`: send one submission over WebSocket and print what comes back

use std::time::Duration;

use chatrelay::app::run_server;
use chatrelay::config::load_config;
use chatrelay::pipeline::MessageSubmission;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chatrelay")]
enum Command {
    /// Start the relay server
    Server,
    /// Send a message over WebSocket and print incoming broadcasts
    Client {
        #[arg(long, default_value = "ws://127.0.0.1:8081")]
        url: String,
        #[arg(long, default_value_t = 1)]
        sender_id: i64,
        #[arg(long, default_value_t = 2)]
        receiver_id: i64,
        #[arg(long, default_value = "hello from chatrelay")]
        content: String,
        /// Seconds to keep listening for broadcasts
        #[arg(long, default_value_t = 5)]
        listen_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = load_config()?;
    chatrelay::utils::logging::init(&config.logging);

    match Command::parse() {
        Command::Server => {
            if let Err(e) = run_server(config).await {
                error!("Server failed: {}", e);
                return Err(e.into());
            }
        }
        Command::Client {
            url,
            sender_id,
            receiver_id,
            content,
            listen_secs,
        } => {
            let submission = MessageSubmission {
                sender_id,
                receiver_id,
                content,
            };
            if let Err(e) = run_client(&url, &submission, Duration::from_secs(listen_secs)).await {
                error!("Client failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(())
}

async fn run_client(
    url: &str,
    submission: &MessageSubmission,
    listen: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let (mut ws_stream, _response) = connect_async(url).await?;
    info!("connected to {url}");

    ws_stream
        .send(WsMessage::Text(serde_json::to_string(submission)?.into()))
        .await?;

    let deadline = tokio::time::sleep(listen);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            incoming = ws_stream.next() => match incoming {
                Some(Ok(WsMessage::Text(msg))) => println!("Incoming: {msg}"),
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }

    ws_stream.close(None).await.ok();
    Ok(())
}
