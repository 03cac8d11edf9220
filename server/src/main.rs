use clap::Parser;
use log::info;
use server::config::{DispatchMode, ServerConfig, MATCH_TIMER_INTERVAL};
use server::game::Match;
use server::network;
use shared::{DEFAULT_HIT_DAMAGE, DEFAULT_MAX_PLAYERS, DEFAULT_PORT};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Maximum number of players in the match
    #[arg(long, default_value_t = DEFAULT_MAX_PLAYERS)]
    max_players: usize,

    /// Damage applied by each hit
    #[arg(long, default_value_t = DEFAULT_HIT_DAMAGE)]
    hit_damage: f32,

    /// Run a timed match, restarting it after this many seconds
    #[arg(long)]
    time_limit: Option<u64>,

    /// Process each connection's messages strictly in arrival order
    #[arg(long)]
    ordered_dispatch: bool,

    /// Remove a player when its connection drops without a LEAVE
    #[arg(long)]
    reap_on_disconnect: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            max_players: self.max_players,
            hit_damage: self.hit_damage,
            time_limit: self.time_limit.map(Duration::from_secs),
            dispatch: if self.ordered_dispatch {
                DispatchMode::Ordered
            } else {
                DispatchMode::Concurrent
            },
            reap_on_disconnect: self.reap_on_disconnect,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = args.into_config();
    let game = Arc::new(Match::new(config.match_settings()));
    game.start();
    info!(
        "Match {} open for up to {} players",
        game.id(),
        config.max_players
    );

    let timer_handle = config.time_limit.map(|limit| {
        info!("Match time limit is {}s", limit.as_secs());
        tokio::spawn(run_match_timer(Arc::clone(&game)))
    });

    let result = tokio::select! {
        result = network::listen(&config, Arc::clone(&game)) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            Ok(())
        }
    };

    if let Some(handle) = timer_handle {
        handle.abort();
    }
    game.end();

    result?;
    Ok(())
}

/// Polls the match clock and restarts the match when its time is up.
async fn run_match_timer(game: Arc<Match>) {
    let mut ticker = interval(MATCH_TIMER_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if game.end_if_time_up() {
            info!("Match {} restarted (epoch {})", game.id(), game.epoch());
        }
    }
}
