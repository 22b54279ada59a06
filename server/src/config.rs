//! Command-line configuration for the server binary.

use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    pub port: u16,
    /// Maximum number of concurrent connections
    #[clap(long, default_value = "64")]
    pub max_clients: usize,
    /// Seconds without any frame before a connection is dropped
    #[clap(long, default_value = "30")]
    pub client_timeout_secs: u64,
    /// Seconds between server pings on each connection
    #[clap(long, default_value = "10")]
    pub ping_interval_secs: u64,
    /// Fixed seed for dice and bot choices (random when omitted)
    #[clap(long)]
    pub seed: Option<u64>,
    /// Pause before passing the turn when a roll has no legal move
    #[clap(long, default_value = "2000")]
    pub no_move_delay_ms: u64,
    /// Pause between a resolved move and the next player's turn
    #[clap(long, default_value = "1200")]
    pub move_pacing_ms: u64,
    /// Pause after announcing an extra turn
    #[clap(long, default_value = "1500")]
    pub extra_turn_delay_ms: u64,
    /// Pause after a turn change before a bot starts thinking
    #[clap(long, default_value = "800")]
    pub turn_pacing_ms: u64,
    /// Bot thinking time before rolling
    #[clap(long, default_value = "2000")]
    pub bot_roll_delay_ms: u64,
    /// Bot thinking time before choosing a token
    #[clap(long, default_value = "1800")]
    pub bot_move_delay_ms: u64,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            no_move: Duration::from_millis(self.no_move_delay_ms),
            move_pacing: Duration::from_millis(self.move_pacing_ms),
            extra_turn: Duration::from_millis(self.extra_turn_delay_ms),
            turn_pacing: Duration::from_millis(self.turn_pacing_ms),
            bot_roll: Duration::from_millis(self.bot_roll_delay_ms),
            bot_move: Duration::from_millis(self.bot_move_delay_ms),
        }
    }
}

/// Delays between automatic game steps.
///
/// State never changes while one of these is running; the session only
/// resumes once the delay has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub no_move: Duration,
    pub move_pacing: Duration,
    pub extra_turn: Duration,
    pub turn_pacing: Duration,
    pub bot_roll: Duration,
    pub bot_move: Duration,
}

impl Pacing {
    /// No delays at all.
    pub fn instant() -> Self {
        Self {
            no_move: Duration::ZERO,
            move_pacing: Duration::ZERO,
            extra_turn: Duration::ZERO,
            turn_pacing: Duration::ZERO,
            bot_roll: Duration::ZERO,
            bot_move: Duration::ZERO,
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            no_move: Duration::from_millis(2000),
            move_pacing: Duration::from_millis(1200),
            extra_turn: Duration::from_millis(1500),
            turn_pacing: Duration::from_millis(800),
            bot_roll: Duration::from_millis(2000),
            bot_move: Duration::from_millis(1800),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pacing_default() {
        let config = ServerConfig::parse_from(["server"]);
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert_eq!(config.pacing(), Pacing::default());
        assert_eq!(config.client_timeout(), Duration::from_secs(30));
        assert_eq!(config.ping_interval(), Duration::from_secs(10));
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::parse_from([
            "server",
            "-H",
            "0.0.0.0",
            "--port",
            "9000",
            "--seed",
            "7",
            "--bot-move-delay-ms",
            "10",
        ]);
        assert_eq!(config.address(), "0.0.0.0:9000");
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.pacing().bot_move, Duration::from_millis(10));
    }
}
