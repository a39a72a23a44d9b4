use clap::{Parser, ValueEnum};
use log::{error, info};
use server::network::{Server, ServerError};
use shared::{FailureBroadcast, GameConfig};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FailureMode {
    /// Failed paints on a real cell go to the requester only
    Requester,
    /// Failed paints on a real cell go to every client
    Everyone,
}

impl From<FailureMode> for FailureBroadcast {
    fn from(mode: FailureMode) -> Self {
        match mode {
            FailureMode::Requester => FailureBroadcast::Requester,
            FailureMode::Everyone => FailureBroadcast::Everyone,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// JSON game configuration; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Side length of the first grid
    #[arg(short, long)]
    grid_size: Option<u32>,

    /// Comma-separated palette, e.g. "#e6194b,#3cb44b"
    #[arg(long, value_delimiter = ',')]
    palette: Option<Vec<String>>,

    /// Paint consumed per painted cell
    #[arg(long)]
    paint_cost: Option<f32>,

    /// Gold per grid cell paid to every player when a grid is finished
    #[arg(long)]
    gold_reward_base: Option<u64>,

    /// Who hears about failed paints on real cells
    #[arg(long, value_enum)]
    failure_broadcast: Option<FailureMode>,
}

impl Args {
    fn game_config(&self) -> Result<GameConfig, ServerError> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str::<GameConfig>(&text)?
            }
            None => GameConfig::default(),
        };

        if let Some(size) = self.grid_size {
            config.initial_grid_size = size;
        }
        if let Some(palette) = &self.palette {
            config.palette = palette.clone();
        }
        if let Some(cost) = self.paint_cost {
            config.paint_cost = cost;
        }
        if let Some(base) = self.gold_reward_base {
            config.gold_reward_base = base;
        }
        if let Some(mode) = self.failure_broadcast {
            config.failure_broadcast = mode.into();
        }

        if config.initial_grid_size == 0 {
            return Err("grid size must be at least 1".into());
        }
        if config.palette.is_empty() || config.palette.len() > usize::from(u8::MAX) {
            return Err("palette must have between 1 and 255 colors".into());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.game_config()?;

    info!(
        "Starting paint server: {}x{} grid, {} colors, paint cost {}",
        config.initial_grid_size,
        config.initial_grid_size,
        config.palette.len(),
        config.paint_cost
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config, args.max_clients).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped with error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
