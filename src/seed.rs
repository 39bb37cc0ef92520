use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::db::models::{Club, Match};
use crate::db::Database;

/// League snapshot loaded into an empty database at start-up.
#[derive(Debug, Deserialize)]
pub struct SeedData {
    pub clubs: Vec<Club>,
    #[serde(default)]
    pub matches: Vec<Match>,
}

impl SeedData {
    pub fn from_json(raw: &str) -> Result<Self> {
        let data: SeedData = serde_json::from_str(raw).context("Invalid seed file")?;
        for m in &data.matches {
            if !data.clubs.iter().any(|c| c.id == m.home_club_id)
                || !data.clubs.iter().any(|c| c.id == m.away_club_id)
            {
                anyhow::bail!("match {} references a club missing from the seed", m.id);
            }
        }
        Ok(data)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Write clubs first so matches can reference them.
    pub fn apply(&self, db: &Database) -> Result<()> {
        for club in &self.clubs {
            db.upsert_club(club)
                .with_context(|| format!("Failed to seed club {}", club.id))?;
        }
        for m in &self.matches {
            db.upsert_match(m)
                .with_context(|| format!("Failed to seed match {}", m.id))?;
        }
        Ok(())
    }
}

/// Seed only when no club exists yet. Returns whether anything was written.
pub fn seed_if_empty(db: &Database, data: &SeedData) -> Result<bool> {
    if db.count_clubs()? > 0 {
        info!("Database already holds clubs; skipping seed");
        return Ok(false);
    }
    data.apply(db)?;
    info!(
        "Seeded {} clubs and {} matches",
        data.clubs.len(),
        data.matches.len()
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{BatchConfig, BatchMode, BatchRunner, CancelToken, PredictionEngine};
    use std::sync::Arc;

    const SAMPLE: &str = include_str!("../data/sample_league.json");

    #[test]
    fn sample_league_seeds_once() {
        let db = Database::open_in_memory().unwrap();
        let data = SeedData::from_json(SAMPLE).unwrap();
        assert!(seed_if_empty(&db, &data).unwrap());
        assert!(!seed_if_empty(&db, &data).unwrap());

        assert_eq!(db.count_clubs().unwrap(), 20);
        let table = db.list_standings().unwrap();
        assert_eq!(table[0].display_name, "Arsenal");
        assert!(table.iter().all(|s| s.standing.is_consistent()));
        assert_eq!(db.list_upcoming_fixtures(100).unwrap().len(), 20);
    }

    #[test]
    fn rejects_matches_with_unknown_clubs() {
        let raw = r#"{
            "clubs": [{"id": 1, "name": "Home"}],
            "matches": [{
                "id": 9, "home_club_id": 1, "away_club_id": 2,
                "match_date": "2025-03-01T15:00:00Z", "match_week": 27,
                "status": "SCHEDULED"
            }]
        }"#;
        let err = SeedData::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("match 9"));
    }

    #[tokio::test]
    async fn seeded_league_predicts_every_upcoming_fixture() {
        let db = Database::open_in_memory().unwrap();
        seed_if_empty(&db, &SeedData::from_json(SAMPLE).unwrap()).unwrap();

        let shared = Arc::new(db.clone());
        let runner = BatchRunner::new(
            Arc::new(PredictionEngine::default()),
            shared.clone(),
            shared.clone(),
            shared.clone(),
            shared,
            BatchConfig::default(),
        );
        let report = runner
            .generate_batch(BatchMode::Missing, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(report.fixtures_considered, 10);
        assert_eq!(report.generated.len(), 10);
        assert!(report.failed.is_empty());
        assert_eq!(db.list_predictions().unwrap().len(), 10);

        let again = runner
            .generate_batch(BatchMode::Missing, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(again.skipped_current.len(), 10);
        assert!(again.generated.is_empty());
    }
}
