use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{FixtureProvider, FormProvider, PredictionSink, StandingsProvider};
use crate::db::models::{ClubStanding, Fixture, Match, Prediction};
use crate::db::Database;

#[async_trait]
impl StandingsProvider for Database {
    fn name(&self) -> &str {
        "sqlite-standings"
    }

    async fn standings(&self) -> Result<Vec<ClubStanding>> {
        let standings = self
            .list_standings()
            .context("Failed to read league table")?;
        for s in standings.iter().filter(|s| !s.standing.is_consistent()) {
            warn!(
                "Inconsistent table row for {} (id {}): {} pts from {}W {}D {}L in {} played",
                s.display_name,
                s.club_id,
                s.standing.points,
                s.standing.won,
                s.standing.drawn,
                s.standing.lost,
                s.standing.played
            );
        }
        debug!("Loaded {} standings rows", standings.len());
        Ok(standings)
    }
}

#[async_trait]
impl FixtureProvider for Database {
    fn name(&self) -> &str {
        "sqlite-fixtures"
    }

    async fn upcoming_fixtures(&self, limit: usize) -> Result<Vec<Fixture>> {
        self.list_upcoming_fixtures(limit)
            .context("Failed to read upcoming fixtures")
    }
}

#[async_trait]
impl FormProvider for Database {
    fn name(&self) -> &str {
        "sqlite-form"
    }

    async fn recent_results(&self, club_id: i64, n: usize) -> Result<Vec<Match>> {
        self.list_recent_results(club_id, n)
            .with_context(|| format!("Failed to read recent results for club {}", club_id))
    }
}

#[async_trait]
impl PredictionSink for Database {
    async fn replace_predictions(&self, predictions: &[Prediction], discard: &[i64]) -> Result<()> {
        Database::replace_predictions(self, predictions, discard)
            .context("Failed to store predictions")
    }

    async fn find_by_fixture(&self, fixture_id: i64) -> Result<Option<Prediction>> {
        self.find_prediction(fixture_id)
    }

    async fn list_all(&self) -> Result<Vec<Prediction>> {
        self.list_predictions()
    }

    async fn list_upcoming(&self, limit: usize) -> Result<Vec<Prediction>> {
        self.list_upcoming_predictions(limit)
    }

    async fn list_by_week(&self, match_week: u32) -> Result<Vec<Prediction>> {
        self.list_predictions_by_week(match_week)
    }

    async fn clear(&self) -> Result<usize> {
        self.clear_predictions()
    }
}
