use clap::Parser;
use client::connection::ReconnectPolicy;
use client::game::PredictionSettings;
use client::network::{Client, ClientCommand, ClientError, ClientOptions};
use log::{info, warn};
use shared::UpgradeKind;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Display name
    #[arg(short = 'n', long, default_value = "painter")]
    name: String,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    /// Automatic reconnect attempts before waiting for a manual retry
    #[arg(short = 'r', long, default_value = "5")]
    reconnect_attempts: u32,

    /// Milliseconds before an unanswered paint request is resent
    #[arg(long, default_value = "1500")]
    pending_timeout: u64,

    /// Resends before a paint request is dropped
    #[arg(long, default_value = "3")]
    retry_limit: u32,
}

/// Maps console lines to client commands:
/// `r` reconnect, `q` quit, `1`/`2`/`3` buy capacity/recharge/speed.
fn parse_command(line: &str) -> Option<ClientCommand> {
    match line.trim() {
        "r" => Some(ClientCommand::Reconnect),
        "q" => Some(ClientCommand::Quit),
        "1" => Some(ClientCommand::Purchase(UpgradeKind::PaintCapacity)),
        "2" => Some(ClientCommand::Purchase(UpgradeKind::RechargeRate)),
        "3" => Some(ClientCommand::Purchase(UpgradeKind::MoveSpeed)),
        _ => None,
    }
}

fn spawn_console(commands: mpsc::UnboundedSender<ClientCommand>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_command(&line) {
                Some(command) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                None => warn!("Unknown command '{}'", line.trim()),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
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
    info!("Commands: r reconnect, q quit, 1/2/3 buy capacity/recharge/speed");

    let mut options = ClientOptions::new(&args.server, &args.name);
    options.fake_ping_ms = args.fake_ping;
    options.prediction = PredictionSettings {
        pending_timeout: Duration::from_millis(args.pending_timeout),
        max_retries: args.retry_limit,
    };
    options.reconnect = ReconnectPolicy {
        max_attempts: args.reconnect_attempts,
        ..ReconnectPolicy::default()
    };

    let (mut client, commands) = Client::new(options);
    spawn_console(commands.clone());

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command(" r\n"), Some(ClientCommand::Reconnect));
        assert_eq!(
            parse_command("3"),
            Some(ClientCommand::Purchase(UpgradeKind::MoveSpeed))
        );
        assert_eq!(parse_command("x"), None);
    }
}
