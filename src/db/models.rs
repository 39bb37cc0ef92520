use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A league club and, once the table has been published, its current standing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Club {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub short_name: Option<String>,
    /// Three-letter code, e.g. "ARS"
    #[serde(default)]
    pub tla: Option<String>,
    #[serde(default)]
    pub crest_url: Option<String>,
    #[serde(default)]
    pub standing: Option<Standing>,
}

impl Club {
    /// Short name if present, otherwise the full name, otherwise `Club #<id>`.
    pub fn display_name(&self) -> String {
        display_name(self.id, &self.name, self.short_name.as_deref())
    }

    /// Engine view of this club, if it has a table row.
    pub fn club_standing(&self) -> Option<ClubStanding> {
        self.standing.clone().map(|standing| ClubStanding {
            club_id: self.id,
            display_name: self.display_name(),
            standing,
        })
    }
}

pub fn display_name(id: i64, name: &str, short_name: Option<&str>) -> String {
    match short_name.map(str::trim).filter(|s| !s.is_empty()) {
        Some(short) => short.to_string(),
        None if !name.trim().is_empty() => name.trim().to_string(),
        None => format!("Club #{}", id),
    }
}

/// One row of the league table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    pub position: u32,
    pub points: u32,
    pub played: u32,
    pub won: u32,
    pub drawn: u32,
    pub lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
}

impl Standing {
    /// `points == 3*won + drawn` and `played == won + drawn + lost`
    pub fn is_consistent(&self) -> bool {
        self.points == 3 * self.won + self.drawn
            && self.played == self.won + self.drawn + self.lost
    }

    /// `None` when no games have been played.
    pub fn points_per_game(&self) -> Option<f64> {
        if self.played == 0 {
            None
        } else {
            Some(self.points as f64 / self.played as f64)
        }
    }
}

/// Standing snapshot handed to the prediction engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClubStanding {
    pub club_id: i64,
    pub display_name: String,
    #[serde(flatten)]
    pub standing: Standing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Scheduled,
    InPlay,
    Paused,
    Finished,
    Postponed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "SCHEDULED",
            MatchStatus::InPlay => "IN_PLAY",
            MatchStatus::Paused => "PAUSED",
            MatchStatus::Finished => "FINISHED",
            MatchStatus::Postponed => "POSTPONED",
            MatchStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SCHEDULED" | "TIMED" => Ok(MatchStatus::Scheduled),
            "IN_PLAY" | "LIVE" => Ok(MatchStatus::InPlay),
            "PAUSED" => Ok(MatchStatus::Paused),
            "FINISHED" => Ok(MatchStatus::Finished),
            "POSTPONED" => Ok(MatchStatus::Postponed),
            "CANCELLED" => Ok(MatchStatus::Cancelled),
            other => anyhow::bail!("unknown match status '{}'", other),
        }
    }
}

/// A league match, scheduled or played.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub home_club_id: i64,
    pub away_club_id: i64,
    pub match_date: DateTime<Utc>,
    pub match_week: u32,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    pub status: MatchStatus,
    #[serde(default)]
    pub home_score: Option<u32>,
    #[serde(default)]
    pub away_score: Option<u32>,
}

impl Match {
    /// `(goals for, goals against)` from the given club's side. `None` when the
    /// club did not play or the score is not recorded.
    pub fn score_for(&self, club_id: i64) -> Option<(u32, u32)> {
        let (home, away) = (self.home_score?, self.away_score?);
        if club_id == self.home_club_id {
            Some((home, away))
        } else if club_id == self.away_club_id {
            Some((away, home))
        } else {
            None
        }
    }
}

/// A scheduled, not-yet-played match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: i64,
    pub home_club_id: i64,
    pub away_club_id: i64,
    pub match_date: DateTime<Utc>,
    pub match_week: u32,
}

impl From<&Match> for Fixture {
    fn from(m: &Match) -> Self {
        Fixture {
            id: m.id,
            home_club_id: m.home_club_id,
            away_club_id: m.away_club_id,
            match_date: m.match_date,
            match_week: m.match_week,
        }
    }
}

/// Points a club took from its most recent finished matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSample {
    pub club_id: i64,
    /// 3 per win, 1 per draw
    pub points: u32,
    /// Matches actually sampled (≤ window)
    pub matches: u32,
}

impl FormSample {
    pub fn max_points(&self) -> u32 {
        3 * self.matches
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    HomeWin,
    Draw,
    AwayWin,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::HomeWin => "HOME_WIN",
            Outcome::Draw => "DRAW",
            Outcome::AwayWin => "AWAY_WIN",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HOME_WIN" => Ok(Outcome::HomeWin),
            "DRAW" => Ok(Outcome::Draw),
            "AWAY_WIN" => Ok(Outcome::AwayWin),
            other => anyhow::bail!("unknown outcome '{}'", other),
        }
    }
}

/// Everything the engine computes for one fixture. Identical inputs give an
/// identical forecast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forecast {
    pub predicted_home_score: u32,
    pub predicted_away_score: u32,
    pub predicted_outcome: Outcome,
    /// Integer percentages, summing to exactly 100
    pub home_win_probability: u8,
    pub draw_probability: u8,
    pub away_win_probability: u8,
    /// 0–100
    pub confidence: u8,
    pub reasoning: String,
    pub home_position: u32,
    pub away_position: u32,
    pub home_points: u32,
    pub away_points: u32,
    pub home_form_points: u32,
    pub away_form_points: u32,
    /// Set when a level rounded scoreline was nudged toward a clear favourite
    pub scoreline_adjusted: bool,
    /// Engine parameters the forecast was computed with
    #[serde(default)]
    pub model_key: String,
}

/// A stored prediction for one fixture. Regeneration replaces the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Option<i64>,
    pub fixture_id: i64,
    pub home_club_id: i64,
    pub away_club_id: i64,
    pub match_date: DateTime<Utc>,
    pub match_week: u32,
    #[serde(flatten)]
    pub forecast: Forecast,
    pub created_at: DateTime<Utc>,
}
