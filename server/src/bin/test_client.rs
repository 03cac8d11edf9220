//! Minimal line-protocol client for poking at a running server.

use clap::Parser;
use log::{info, warn};
use shared::{Envelope, DEFAULT_PORT};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Name to join with
    #[arg(short, long, default_value = "player")]
    name: String,

    /// Player to hit after joining
    #[arg(short, long)]
    target: Option<String>,

    /// How many times to hit the target
    #[arg(long, default_value_t = 2)]
    hits: u32,

    /// Seconds to stay connected before leaving
    #[arg(short, long, default_value_t = 2)]
    linger: u64,
}

async fn send(
    writer: &mut OwnedWriteHalf,
    envelope: &Envelope,
) -> Result<(), Box<dyn std::error::Error>> {
    writer.write_all(&envelope.to_line()?).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    info!("Connected to {} from {}", args.server, stream.local_addr()?);
    let (read_half, mut writer) = stream.into_split();

    let reader_handle = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match Envelope::from_slice(line.as_bytes()) {
                    Ok(envelope) => info!("<- {:?}", envelope),
                    Err(e) => warn!("Unreadable line {:?}: {}", line, e),
                },
                Ok(None) => {
                    info!("Server closed the connection");
                    break;
                }
                Err(e) => {
                    warn!("Read error: {}", e);
                    break;
                }
            }
        }
    });

    send(&mut writer, &Envelope::Connect).await?;
    send(
        &mut writer,
        &Envelope::Join {
            name: args.name.clone(),
            identity: None,
            result: None,
        },
    )
    .await?;
    sleep(Duration::from_millis(200)).await;

    if let Some(target) = &args.target {
        for _ in 0..args.hits {
            send(
                &mut writer,
                &Envelope::Hit {
                    victim: target.clone(),
                    damage: 0.0,
                },
            )
            .await?;
            sleep(Duration::from_millis(100)).await;
        }
    }

    sleep(Duration::from_secs(args.linger)).await;
    send(&mut writer, &Envelope::Leave { name: None }).await?;

    let _ = tokio::time::timeout(Duration::from_secs(1), reader_handle).await;
    Ok(())
}
