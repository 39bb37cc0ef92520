//! Read-only data sources feeding the batch runner, plus the sink it writes to.
//!
//! `Err` from a provider means the source could not be reached; "no data for
//! this club" is an empty result, not an error.

use anyhow::Result;
use async_trait::async_trait;

pub mod sqlite;

use crate::db::models::{ClubStanding, Fixture, Match, Prediction};

/// Current league table. Read once per batch.
#[async_trait]
pub trait StandingsProvider: Send + Sync {
    async fn standings(&self) -> Result<Vec<ClubStanding>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Scheduled fixtures awaiting a prediction.
#[async_trait]
pub trait FixtureProvider: Send + Sync {
    /// Up to `limit` scheduled fixtures, soonest first.
    async fn upcoming_fixtures(&self, limit: usize) -> Result<Vec<Fixture>>;

    fn name(&self) -> &str;
}

/// Finished results per club.
#[async_trait]
pub trait FormProvider: Send + Sync {
    /// Up to `n` finished matches involving `club_id`, newest first.
    async fn recent_results(&self, club_id: i64, n: usize) -> Result<Vec<Match>>;

    fn name(&self) -> &str;
}

/// Where finished predictions go, and where they are read back from.
#[async_trait]
pub trait PredictionSink: Send + Sync {
    /// Store predictions, replacing any existing one for the same fixture,
    /// and drop the stored prediction of every fixture in `discard`.
    /// All of it happens or none of it does.
    async fn replace_predictions(&self, predictions: &[Prediction], discard: &[i64])
        -> Result<()>;

    async fn find_by_fixture(&self, fixture_id: i64) -> Result<Option<Prediction>>;

    async fn list_all(&self) -> Result<Vec<Prediction>>;

    /// Predictions for still-scheduled fixtures, soonest first
    async fn list_upcoming(&self, limit: usize) -> Result<Vec<Prediction>>;

    async fn list_by_week(&self, match_week: u32) -> Result<Vec<Prediction>>;

    /// Remove every prediction; returns how many went
    async fn clear(&self) -> Result<usize>;
}
