use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

/// Thread-safe SQLite connection pool (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    /// Private in-memory database
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    // ── Clubs ─────────────────────────────────────────────────────────────────

    /// Insert or update a club together with its table row
    pub fn upsert_club(&self, club: &Club) -> Result<()> {
        let conn = self.lock()?;
        let s = club.standing.as_ref();
        conn.execute(
            "INSERT INTO clubs (id, name, short_name, tla, crest_url,
                                position, points, played, won, drawn, lost,
                                goals_for, goals_against, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
             ON CONFLICT(id) DO UPDATE SET
                name=excluded.name,
                short_name=excluded.short_name,
                tla=excluded.tla,
                crest_url=excluded.crest_url,
                position=excluded.position,
                points=excluded.points,
                played=excluded.played,
                won=excluded.won,
                drawn=excluded.drawn,
                lost=excluded.lost,
                goals_for=excluded.goals_for,
                goals_against=excluded.goals_against,
                updated_at=excluded.updated_at",
            params![
                club.id,
                club.name,
                club.short_name,
                club.tla,
                club.crest_url,
                s.map(|s| s.position),
                s.map(|s| s.points),
                s.map(|s| s.played),
                s.map(|s| s.won),
                s.map(|s| s.drawn),
                s.map(|s| s.lost),
                s.map(|s| s.goals_for),
                s.map(|s| s.goals_against),
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn count_clubs(&self) -> Result<i64> {
        let conn = self.lock()?;
        let n = conn.query_row("SELECT COUNT(*) FROM clubs", [], |r| r.get(0))?;
        Ok(n)
    }

    /// All clubs in table order; clubs without a standing come last
    pub fn list_clubs(&self) -> Result<Vec<Club>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM clubs ORDER BY position IS NULL, position, name",
            CLUB_COLUMNS
        ))?;
        let clubs = stmt
            .query_map([], map_club)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(clubs)
    }

    /// Clubs that currently have a table row, in position order
    pub fn list_standings(&self) -> Result<Vec<ClubStanding>> {
        Ok(self
            .list_clubs()?
            .iter()
            .filter_map(Club::club_standing)
            .collect())
    }

    // ── Matches ───────────────────────────────────────────────────────────────

    /// Insert or update a match. A finished match keeps its recorded result;
    /// use [`Database::record_result`] with `correction` to change it.
    pub fn upsert_match(&self, m: &Match) -> Result<()> {
        let conn = self.lock()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT status FROM matches WHERE id=?1",
                params![m.id],
                |r| r.get(0),
            )
            .optional()?;
        if existing.as_deref() == Some(MatchStatus::Finished.as_str())
            && m.status != MatchStatus::Finished
        {
            bail!("match {} is finished and cannot be rescheduled", m.id);
        }
        conn.execute(
            "INSERT INTO matches (id, home_club_id, away_club_id, match_date, match_week,
                                  season, venue, status, home_score, away_score, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
             ON CONFLICT(id) DO UPDATE SET
                match_date=excluded.match_date,
                match_week=excluded.match_week,
                season=excluded.season,
                venue=excluded.venue,
                status=excluded.status,
                home_score=CASE WHEN matches.status='FINISHED'
                                THEN matches.home_score ELSE excluded.home_score END,
                away_score=CASE WHEN matches.status='FINISHED'
                                THEN matches.away_score ELSE excluded.away_score END,
                updated_at=excluded.updated_at",
            params![
                m.id,
                m.home_club_id,
                m.away_club_id,
                m.match_date,
                m.match_week,
                m.season,
                m.venue,
                m.status.as_str(),
                m.home_score,
                m.away_score,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    pub fn get_match(&self, id: i64) -> Result<Option<Match>> {
        let conn = self.lock()?;
        let m = conn
            .query_row(
                &format!("SELECT {} FROM matches WHERE id=?1", MATCH_COLUMNS),
                params![id],
                map_match,
            )
            .optional()?;
        Ok(m)
    }

    /// Record a final score. Finished matches are immutable unless this is an
    /// administrative `correction`.
    pub fn record_result(
        &self,
        match_id: i64,
        home_score: u32,
        away_score: u32,
        correction: bool,
    ) -> Result<()> {
        let conn = self.lock()?;
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM matches WHERE id=?1",
                params![match_id],
                |r| r.get(0),
            )
            .optional()?;
        match status {
            None => bail!("match {} not found", match_id),
            Some(s) if s == MatchStatus::Finished.as_str() && !correction => {
                bail!("match {} is already finished; pass a correction to amend it", match_id)
            }
            Some(_) => {}
        }
        conn.execute(
            "UPDATE matches SET status=?1, home_score=?2, away_score=?3, updated_at=?4
             WHERE id=?5",
            params![
                MatchStatus::Finished.as_str(),
                home_score,
                away_score,
                Utc::now(),
                match_id
            ],
        )?;
        Ok(())
    }

    /// Scheduled matches, soonest first
    pub fn list_upcoming_fixtures(&self, limit: usize) -> Result<Vec<Fixture>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM matches WHERE status='SCHEDULED'
             ORDER BY match_date ASC, id ASC LIMIT ?1",
            MATCH_COLUMNS
        ))?;
        let fixtures = stmt
            .query_map(params![limit as i64], map_match)?
            .map(|m| m.map(|m| Fixture::from(&m)))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(fixtures)
    }

    /// Finished, scored matches involving a club, newest first
    pub fn list_recent_results(&self, club_id: i64, limit: usize) -> Result<Vec<Match>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM matches
             WHERE (home_club_id=?1 OR away_club_id=?1)
               AND status='FINISHED'
               AND home_score IS NOT NULL AND away_score IS NOT NULL
             ORDER BY match_date DESC, id DESC LIMIT ?2",
            MATCH_COLUMNS
        ))?;
        let matches = stmt
            .query_map(params![club_id, limit as i64], map_match)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(matches)
    }

    // ── Predictions ───────────────────────────────────────────────────────────

    /// Write predictions in one transaction, superseding any existing
    /// prediction for the same fixture. Stored predictions for the fixtures in
    /// `discard` are deleted in the same transaction.
    pub fn replace_predictions(&self, predictions: &[Prediction], discard: &[i64]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for fixture_id in discard {
            tx.execute(
                "DELETE FROM predictions WHERE match_id=?1",
                params![fixture_id],
            )?;
        }
        for p in predictions {
            let f = &p.forecast;
            tx.execute(
                "DELETE FROM predictions WHERE match_id=?1",
                params![p.fixture_id],
            )?;
            tx.execute(
                "INSERT INTO predictions (
                    match_id, predicted_home_score, predicted_away_score, predicted_outcome,
                    home_win_probability, draw_probability, away_win_probability, confidence,
                    reasoning, home_position, away_position, home_points, away_points,
                    home_form_points, away_form_points, scoreline_adjusted, model_key, created_at
                 ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)",
                params![
                    p.fixture_id,
                    f.predicted_home_score,
                    f.predicted_away_score,
                    f.predicted_outcome.as_str(),
                    f.home_win_probability,
                    f.draw_probability,
                    f.away_win_probability,
                    f.confidence,
                    f.reasoning,
                    f.home_position,
                    f.away_position,
                    f.home_points,
                    f.away_points,
                    f.home_form_points,
                    f.away_form_points,
                    f.scoreline_adjusted,
                    f.model_key,
                    p.created_at,
                ],
            )
            .with_context(|| format!("Failed to store prediction for match {}", p.fixture_id))?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn find_prediction(&self, fixture_id: i64) -> Result<Option<Prediction>> {
        let conn = self.lock()?;
        let p = conn
            .query_row(
                &format!("{} WHERE p.match_id=?1", PREDICTION_SELECT),
                params![fixture_id],
                map_prediction,
            )
            .optional()?;
        Ok(p)
    }

    pub fn list_predictions(&self) -> Result<Vec<Prediction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY m.match_date ASC, p.match_id ASC",
            PREDICTION_SELECT
        ))?;
        let rows = stmt
            .query_map([], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Predictions for fixtures that are still scheduled, soonest first
    pub fn list_upcoming_predictions(&self, limit: usize) -> Result<Vec<Prediction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE m.status='SCHEDULED' ORDER BY m.match_date ASC, p.match_id ASC LIMIT ?1",
            PREDICTION_SELECT
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn list_predictions_by_week(&self, match_week: u32) -> Result<Vec<Prediction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE m.match_week=?1 ORDER BY m.match_date ASC, p.match_id ASC",
            PREDICTION_SELECT
        ))?;
        let rows = stmt
            .query_map(params![match_week], map_prediction)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete every prediction; returns how many were removed
    pub fn clear_predictions(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n = conn.execute("DELETE FROM predictions", [])?;
        Ok(n)
    }
}

// ── SQL helpers ────────────────────────────────────────────────────────────────

const CLUB_COLUMNS: &str = "id, name, short_name, tla, crest_url,
    position, points, played, won, drawn, lost, goals_for, goals_against";

const MATCH_COLUMNS: &str = "id, home_club_id, away_club_id, match_date, match_week,
    season, venue, status, home_score, away_score";

const PREDICTION_SELECT: &str = "SELECT p.id, p.match_id, m.home_club_id, m.away_club_id,
    m.match_date, m.match_week, p.predicted_home_score, p.predicted_away_score,
    p.predicted_outcome, p.home_win_probability, p.draw_probability,
    p.away_win_probability, p.confidence, p.reasoning, p.home_position,
    p.away_position, p.home_points, p.away_points, p.home_form_points,
    p.away_form_points, p.scoreline_adjusted, p.model_key, p.created_at
    FROM predictions p JOIN matches m ON m.id = p.match_id";

fn parse_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

fn map_club(row: &rusqlite::Row) -> rusqlite::Result<Club> {
    let position: Option<u32> = row.get(5)?;
    let standing = match position {
        Some(position) => Some(Standing {
            position,
            points: row.get::<_, Option<u32>>(6)?.unwrap_or(0),
            played: row.get::<_, Option<u32>>(7)?.unwrap_or(0),
            won: row.get::<_, Option<u32>>(8)?.unwrap_or(0),
            drawn: row.get::<_, Option<u32>>(9)?.unwrap_or(0),
            lost: row.get::<_, Option<u32>>(10)?.unwrap_or(0),
            goals_for: row.get::<_, Option<u32>>(11)?.unwrap_or(0),
            goals_against: row.get::<_, Option<u32>>(12)?.unwrap_or(0),
        }),
        None => None,
    };
    Ok(Club {
        id: row.get(0)?,
        name: row.get(1)?,
        short_name: row.get(2)?,
        tla: row.get(3)?,
        crest_url: row.get(4)?,
        standing,
    })
}

fn map_match(row: &rusqlite::Row) -> rusqlite::Result<Match> {
    Ok(Match {
        id: row.get(0)?,
        home_club_id: row.get(1)?,
        away_club_id: row.get(2)?,
        match_date: row.get(3)?,
        match_week: row.get(4)?,
        season: row.get(5)?,
        venue: row.get(6)?,
        status: parse_column(row, 7)?,
        home_score: row.get(8)?,
        away_score: row.get(9)?,
    })
}

fn map_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
    Ok(Prediction {
        id: row.get(0)?,
        fixture_id: row.get(1)?,
        home_club_id: row.get(2)?,
        away_club_id: row.get(3)?,
        match_date: row.get(4)?,
        match_week: row.get(5)?,
        forecast: Forecast {
            predicted_home_score: row.get(6)?,
            predicted_away_score: row.get(7)?,
            predicted_outcome: parse_column(row, 8)?,
            home_win_probability: row.get(9)?,
            draw_probability: row.get(10)?,
            away_win_probability: row.get(11)?,
            confidence: row.get(12)?,
            reasoning: row.get(13)?,
            home_position: row.get(14)?,
            away_position: row.get(15)?,
            home_points: row.get(16)?,
            away_points: row.get(17)?,
            home_form_points: row.get(18)?,
            away_form_points: row.get(19)?,
            scoreline_adjusted: row.get(20)?,
            model_key: row.get(21)?,
        },
        created_at: row.get(22)?,
    })
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS clubs (
    id            INTEGER PRIMARY KEY,
    name          TEXT    NOT NULL UNIQUE,
    short_name    TEXT,
    tla           TEXT,
    crest_url     TEXT,
    position      INTEGER,
    points        INTEGER,
    played        INTEGER,
    won           INTEGER,
    drawn         INTEGER,
    lost          INTEGER,
    goals_for     INTEGER,
    goals_against INTEGER,
    updated_at    TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS matches (
    id            INTEGER PRIMARY KEY,
    home_club_id  INTEGER NOT NULL,
    away_club_id  INTEGER NOT NULL,
    match_date    TEXT    NOT NULL,
    match_week    INTEGER NOT NULL,
    season        TEXT,
    venue         TEXT,
    status        TEXT    NOT NULL DEFAULT 'SCHEDULED',
    home_score    INTEGER,
    away_score    INTEGER,
    updated_at    TEXT    NOT NULL,
    FOREIGN KEY (home_club_id) REFERENCES clubs(id),
    FOREIGN KEY (away_club_id) REFERENCES clubs(id)
);

CREATE TABLE IF NOT EXISTS predictions (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    match_id              INTEGER NOT NULL UNIQUE,
    predicted_home_score  INTEGER NOT NULL,
    predicted_away_score  INTEGER NOT NULL,
    predicted_outcome     TEXT    NOT NULL,
    home_win_probability  INTEGER NOT NULL,
    draw_probability      INTEGER NOT NULL,
    away_win_probability  INTEGER NOT NULL,
    confidence            INTEGER NOT NULL,
    reasoning             TEXT    NOT NULL,
    home_position         INTEGER NOT NULL,
    away_position         INTEGER NOT NULL,
    home_points           INTEGER NOT NULL,
    away_points           INTEGER NOT NULL,
    home_form_points      INTEGER NOT NULL,
    away_form_points      INTEGER NOT NULL,
    scoreline_adjusted    INTEGER NOT NULL DEFAULT 0,
    model_key             TEXT    NOT NULL DEFAULT '',
    created_at            TEXT    NOT NULL,
    FOREIGN KEY (match_id) REFERENCES matches(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_matches_status_date ON matches(status, match_date);
CREATE INDEX IF NOT EXISTS idx_matches_home ON matches(home_club_id);
CREATE INDEX IF NOT EXISTS idx_matches_away ON matches(away_club_id);
CREATE INDEX IF NOT EXISTS idx_matches_week ON matches(match_week);
"#;
