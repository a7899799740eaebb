//! Subscribe to a channel and print arriving events.
//!
//! Run with: cargo run --example subscribe -- <server-url> <channel>

use bayeux_tokio_http::Client;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let server = args
        .next()
        .unwrap_or_else(|| "http://localhost:8080/cometd".to_string());
    let channel = args.next().unwrap_or_else(|| "/foo/bar".to_string());

    println!("Bayeux subscribe example");
    println!("========================\n");
    println!("Connecting to {server}, subscribing to {channel}");
    println!("Press ctrl-c to disconnect\n");

    let client = Client::new(&server)?;
    let cancel = CancellationToken::new();
    let mut errors = client.start(cancel.clone());
    let mut subscription = client.subscribe(channel.as_str()).await?;

    loop {
        tokio::select! {
            batch = subscription.next() => {
                let Some(batch) = batch else {
                    println!("subscription closed");
                    break;
                };
                for message in batch {
                    let data = message
                        .data
                        .as_ref()
                        .map(|raw| raw.get().to_string())
                        .unwrap_or_default();
                    println!("[{}] {}", message.channel, data);
                }
            }
            Some(err) = errors.recv() => {
                eprintln!("client error: {err}");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                println!("disconnecting");
                client.disconnect();
            }
        }
    }

    Ok(())
}
