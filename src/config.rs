use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::constants::{DAY_NIGHT_CYCLE_MS, ORB_COUNT, RECONNECT_DELAY_MS};
use crate::engine::SimulationConfig;

/// Installs the fmt subscriber. `RUST_LOG` wins; otherwise `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// World tunables shared by the server and the headless harness.
#[derive(clap::Args, Clone, Debug)]
pub struct WorldArgs {
    /// Simulation seed; a random one is drawn when absent.
    #[arg(long, env = "SOUL_ARENA_SEED")]
    pub seed: Option<u32>,
    #[arg(long, default_value_t = 12)]
    pub souls_per_team: usize,
    #[arg(long, default_value_t = ORB_COUNT)]
    pub orb_count: usize,
    #[arg(long, default_value_t = 4)]
    pub min_population: usize,
    #[arg(long, default_value_t = DAY_NIGHT_CYCLE_MS)]
    pub day_night_cycle_ms: u64,
}

impl WorldArgs {
    pub fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            seed: self.seed.unwrap_or_else(rand::random),
            souls_per_team: self.souls_per_team,
            orb_count: self.orb_count,
            min_population: self.min_population,
            day_night_cycle_ms: self.day_night_cycle_ms.max(2),
        }
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Authoritative soul arena server")]
pub struct ServerArgs {
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
    #[arg(long, env = "BIND_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Directory served at `/` when it contains an `index.html`.
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
    #[command(flatten)]
    pub world: WorldArgs,
}

impl ServerArgs {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Headless reconciling viewer")]
pub struct ViewerArgs {
    #[arg(long, env = "SOUL_ARENA_URL", default_value = "ws://127.0.0.1:8080/ws")]
    pub url: String,
    #[arg(long, default_value_t = RECONNECT_DELAY_MS)]
    pub reconnect_delay_ms: u64,
    #[arg(long, default_value_t = 60)]
    pub fps: u32,
    /// Seconds between status lines.
    #[arg(long, default_value_t = 5)]
    pub report_every: u64,
    /// Exit after this many seconds; runs until killed when absent.
    #[arg(long)]
    pub duration_secs: Option<u64>,
}

impl ViewerArgs {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.clamp(1, 240)))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Headless invariant-checking simulation")]
pub struct SimulateArgs {
    /// Simulated minutes per scenario.
    #[arg(long, default_value_t = 3)]
    pub minutes: u32,
    /// Run one custom scenario from the world flags instead of the presets.
    #[arg(long)]
    pub single: bool,
    #[arg(long)]
    pub summary_out: Option<PathBuf>,
    #[command(flatten)]
    pub world: WorldArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_args_defaults() {
        let args = ServerArgs::try_parse_from(["server", "--seed", "9"]).expect("parses");
        assert_eq!(args.world.seed, Some(9));
        assert_eq!(args.world.souls_per_team, 12);
        assert!(args.bind_addr().ends_with(":8080") || std::env::var("PORT").is_ok());
        assert_eq!(args.world.simulation_config().seed, 9);
    }

    #[test]
    fn viewer_frame_interval_is_clamped() {
        let args = ViewerArgs::try_parse_from(["viewer", "--fps", "0"]).expect("parses");
        assert_eq!(args.frame_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn simulate_args_accept_world_flags() {
        let args = SimulateArgs::try_parse_from([
            "simulate",
            "--single",
            "--souls-per-team",
            "3",
            "--minutes",
            "1",
        ])
        .expect("parses");
        assert!(args.single);
        assert_eq!(args.world.souls_per_team, 3);
        assert_eq!(args.minutes, 1);
    }
}
