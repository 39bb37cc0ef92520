use clap::Parser;
use std::time::Duration;

use crate::predictor::{BatchConfig, EngineParams};

/// League match prediction service
#[derive(Parser, Debug, Clone)]
#[command(name = "league-predictor", version, about)]
pub struct Config {
    /// HTTP API listen address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8080")]
    pub api_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "league.db")]
    pub database_path: String,

    /// JSON league snapshot loaded when the database has no clubs
    #[arg(long, env = "SEED_PATH")]
    pub seed_path: Option<String>,

    /// Finished matches per form sample
    #[arg(long, env = "FORM_WINDOW", default_value = "5")]
    pub form_window: u32,

    /// Upcoming fixtures considered per batch
    #[arg(long, env = "UPCOMING_LIMIT", default_value = "10")]
    pub upcoming_limit: usize,

    /// Concurrent prediction workers
    #[arg(long, env = "WORKERS", default_value = "4")]
    pub workers: usize,

    /// Seconds after which a batch stops starting new fixtures
    #[arg(long, env = "BATCH_TIMEOUT_SECS", default_value = "30")]
    pub batch_timeout_secs: u64,

    /// Seconds allowed for each provider read
    #[arg(long, env = "PROVIDER_TIMEOUT_SECS", default_value = "10")]
    pub provider_timeout_secs: u64,

    /// Scheduled generation interval in seconds (0 disables)
    #[arg(long, env = "GENERATE_INTERVAL_SECS", default_value = "3600")]
    pub generate_interval_secs: u64,

    /// Clubs in the league
    #[arg(long, env = "LEAGUE_SIZE", default_value = "20")]
    pub league_size: u32,

    /// Home advantage in goals
    #[arg(long, env = "HOME_ADVANTAGE", default_value = "0.3")]
    pub home_advantage: f64,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=38).contains(&self.form_window) {
            anyhow::bail!("form_window must be between 1 and 38");
        }
        if self.upcoming_limit == 0 {
            anyhow::bail!("upcoming_limit must be at least 1");
        }
        if !(1..=64).contains(&self.workers) {
            anyhow::bail!("workers must be between 1 and 64");
        }
        if self.batch_timeout_secs == 0 {
            anyhow::bail!("batch_timeout_secs must be at least 1");
        }
        if self.provider_timeout_secs == 0 {
            anyhow::bail!("provider_timeout_secs must be at least 1");
        }
        if self.league_size < 2 {
            anyhow::bail!("league_size must be at least 2");
        }
        if !(0.0..=1.5).contains(&self.home_advantage) {
            anyhow::bail!("home_advantage must be between 0.0 and 1.5");
        }
        Ok(())
    }

    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            league_size: self.league_size,
            home_advantage: self.home_advantage,
            ..EngineParams::default()
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            upcoming_limit: self.upcoming_limit,
            form_window: self.form_window,
            workers: self.workers,
            timeout: Duration::from_secs(self.batch_timeout_secs),
            provider_timeout: Duration::from_secs(self.provider_timeout_secs),
        }
    }

    /// `None` when scheduled generation is disabled.
    pub fn generate_interval(&self) -> Option<Duration> {
        (self.generate_interval_secs > 0).then(|| Duration::from_secs(self.generate_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("league-predictor").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]);
        config.validate().unwrap();
        assert_eq!(config.engine_params(), EngineParams::default());
        assert_eq!(config.batch_config().workers, 4);
        assert_eq!(config.generate_interval(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["--workers", "0"]).validate().is_err());
        assert!(parse(&["--form-window", "39"]).validate().is_err());
        assert!(parse(&["--home-advantage", "2.0"]).validate().is_err());
        assert!(parse(&["--league-size", "1"]).validate().is_err());
    }

    #[test]
    fn zero_interval_disables_scheduler() {
        assert_eq!(parse(&["--generate-interval-secs", "0"]).generate_interval(), None);
    }
}
