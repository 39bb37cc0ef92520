//! Pre-match outcome model.
//!
//! Each club gets a strength score in [0, 1] built from three signals:
//! recent form, points per game, and league position, with form weighted
//! highest. The strength gap becomes a goal-expectancy shift through `tanh`,
//! a fixed home-advantage term is added, and the resulting pair of goal rates
//! drives a Poisson scoreline model from which the outcome probabilities are
//! read.
//!
//! Nothing here touches storage. Apart from the creation timestamp stamped by
//! `generate`, the same inputs always produce the same [`Forecast`].

use chrono::Utc;

use crate::db::models::{ClubStanding, Fixture, Forecast, FormSample, Outcome, Prediction};
use crate::error::{MissingData, PredictionError};

use super::reasoning::{rationale, RationaleInput};

/// Largest goal count modelled per side; the Poisson tail is folded into it.
const MAX_GOALS: u32 = 10;
/// Expected-goal rates are kept inside this band.
const MIN_GOAL_RATE: f64 = 0.20;
const MAX_GOAL_RATE: f64 = 3.80;

/// Tunable weights and offsets. Defaults are the production values.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineParams {
    /// Number of clubs in the league (position 1..=league_size).
    pub league_size: u32,
    pub form_weight: f64,
    pub ppg_weight: f64,
    pub position_weight: f64,
    /// Total goals expected between two equal sides on neutral ground.
    pub base_goals: f64,
    /// Goal-expectancy bonus for the home side. Negative favours the away side.
    pub home_advantage: f64,
    /// Maximum goal-expectancy shift from the strength differential.
    pub goal_swing: f64,
    /// Steepness of the strength → goals curve.
    pub strength_scale: f64,
    /// Win-probability gap (points) that counts as a clear favourite when the
    /// rounded scoreline comes out level.
    pub favourite_margin: u8,
}

impl EngineParams {
    /// Compact rendering of every parameter; two parameter sets share a key
    /// only when they produce the same forecasts.
    pub fn model_key(&self) -> String {
        format!(
            "n{}:f{}:p{}:q{}:b{}:h{}:s{}:k{}:m{}",
            self.league_size,
            self.form_weight,
            self.ppg_weight,
            self.position_weight,
            self.base_goals,
            self.home_advantage,
            self.goal_swing,
            self.strength_scale,
            self.favourite_margin
        )
    }
}

impl Default for EngineParams {
    fn default() -> Self {
        EngineParams {
            league_size: 20,
            form_weight: 0.5,
            ppg_weight: 0.3,
            position_weight: 0.2,
            base_goals: 2.6,
            home_advantage: 0.3,
            goal_swing: 1.6,
            strength_scale: 1.5,
            favourite_margin: 20,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PredictionEngine {
    params: EngineParams,
}

impl PredictionEngine {
    pub fn new(params: EngineParams) -> Self {
        PredictionEngine { params }
    }

    pub fn model_key(&self) -> String {
        self.params.model_key()
    }

    /// Predict one fixture. Fails with `InsufficientData` when either club
    /// has no standing, has not played, or has no form sample.
    pub fn generate(
        &self,
        fixture: &Fixture,
        home: Option<&ClubStanding>,
        away: Option<&ClubStanding>,
        home_form: Option<&FormSample>,
        away_form: Option<&FormSample>,
    ) -> Result<Prediction, PredictionError> {
        let home = home.ok_or_else(|| {
            PredictionError::insufficient(fixture.home_club_id, MissingData::Standing)
        })?;
        let away = away.ok_or_else(|| {
            PredictionError::insufficient(fixture.away_club_id, MissingData::Standing)
        })?;
        let home_form = home_form
            .ok_or_else(|| PredictionError::insufficient(fixture.home_club_id, MissingData::Form))?;
        let away_form = away_form
            .ok_or_else(|| PredictionError::insufficient(fixture.away_club_id, MissingData::Form))?;

        let forecast = self.forecast(home, away, home_form, away_form)?;

        Ok(Prediction {
            id: None,
            fixture_id: fixture.id,
            home_club_id: fixture.home_club_id,
            away_club_id: fixture.away_club_id,
            match_date: fixture.match_date,
            match_week: fixture.match_week,
            forecast,
            created_at: Utc::now(),
        })
    }

    /// The computed part of a prediction.
    pub fn forecast(
        &self,
        home: &ClubStanding,
        away: &ClubStanding,
        home_form: &FormSample,
        away_form: &FormSample,
    ) -> Result<Forecast, PredictionError> {
        let home_strength = self.strength(home, home_form)?;
        let away_strength = self.strength(away, away_form)?;
        let differential = home_strength - away_strength;

        let (lambda_home, lambda_away) = self.expected_goals(differential);
        let (p_home, p_draw, p_away) =
            outcome_probs_poisson(lambda_home, lambda_away, MAX_GOALS);
        let (home_pct, draw_pct, away_pct) = to_percentages(p_home, p_draw, p_away);

        let rounded = (round_goals(lambda_home), round_goals(lambda_away));
        let (home_score, away_score, adjusted) =
            self.scoreline(rounded, home_pct, away_pct);

        let predicted_outcome = match home_score.cmp(&away_score) {
            std::cmp::Ordering::Greater => Outcome::HomeWin,
            std::cmp::Ordering::Less => Outcome::AwayWin,
            std::cmp::Ordering::Equal => Outcome::Draw,
        };

        let reasoning = rationale(&RationaleInput {
            home,
            away,
            home_form,
            away_form,
            home_advantage: self.params.home_advantage,
            expected_goals: (lambda_home, lambda_away),
            rounded_score: rounded,
            final_score: (home_score, away_score),
            adjusted,
        });

        Ok(Forecast {
            predicted_home_score: home_score,
            predicted_away_score: away_score,
            predicted_outcome,
            home_win_probability: home_pct,
            draw_probability: draw_pct,
            away_win_probability: away_pct,
            confidence: confidence(home_pct, draw_pct, away_pct),
            reasoning,
            home_position: home.standing.position,
            away_position: away.standing.position,
            home_points: home.standing.points,
            away_points: away.standing.points,
            home_form_points: home_form.points,
            away_form_points: away_form.points,
            scoreline_adjusted: adjusted,
            model_key: self.params.model_key(),
        })
    }

    /// Weighted strength in [0, 1].
    fn strength(&self, club: &ClubStanding, form: &FormSample) -> Result<f64, PredictionError> {
        let ppg = club
            .standing
            .points_per_game()
            .ok_or_else(|| PredictionError::insufficient(club.club_id, MissingData::MatchesPlayed))?;
        if form.matches == 0 {
            return Err(PredictionError::insufficient(club.club_id, MissingData::Form));
        }

        let form_score = form.points.min(form.max_points()) as f64 / form.max_points() as f64;
        let ppg_score = (ppg / 3.0).clamp(0.0, 1.0);
        let position_score = self.position_score(club.standing.position);

        let p = &self.params;
        let total_weight = p.form_weight + p.ppg_weight + p.position_weight;
        if total_weight <= 0.0 {
            return Ok(0.5);
        }
        Ok((p.form_weight * form_score + p.ppg_weight * ppg_score + p.position_weight * position_score)
            / total_weight)
    }

    /// 1.0 for top of the table, 0.0 for bottom.
    fn position_score(&self, position: u32) -> f64 {
        let size = self.params.league_size;
        if size < 2 {
            return 0.5;
        }
        let position = position.clamp(1, size);
        (size - position) as f64 / (size - 1) as f64
    }

    /// `(λ_home, λ_away)` for a strength differential in [-1, 1].
    fn expected_goals(&self, differential: f64) -> (f64, f64) {
        let p = &self.params;
        let shift = p.goal_swing * (p.strength_scale * differential).tanh();
        let edge = (p.home_advantage + shift) / 2.0;
        let half = p.base_goals / 2.0;
        (
            (half + edge).clamp(MIN_GOAL_RATE, MAX_GOAL_RATE),
            (half - edge).clamp(MIN_GOAL_RATE, MAX_GOAL_RATE),
        )
    }

    /// Level rounded scores with a clear favourite get one extra goal for the
    /// favourite. Returns `(home, away, adjusted)`.
    fn scoreline(&self, rounded: (u32, u32), home_pct: u8, away_pct: u8) -> (u32, u32, bool) {
        let (home, away) = rounded;
        if home != away {
            return (home, away, false);
        }
        let margin = self.params.favourite_margin as i32;
        let gap = home_pct as i32 - away_pct as i32;
        if gap >= margin {
            (home + 1, away, true)
        } else if -gap >= margin {
            (home, away + 1, true)
        } else {
            (home, away, false)
        }
    }
}

fn round_goals(lambda: f64) -> u32 {
    lambda.round().max(0.0) as u32
}

/// P(home win), P(draw), P(away win) for independent Poisson goal counts.
fn outcome_probs_poisson(lambda_home: f64, lambda_away: f64, max_goals: u32) -> (f64, f64, f64) {
    let pmf_h = poisson_pmf(lambda_home, max_goals);
    let pmf_a = poisson_pmf(lambda_away, max_goals);

    let mut p_home = 0.0;
    let mut p_draw = 0.0;
    let mut p_away = 0.0;

    for (i, p_i) in pmf_h.iter().enumerate() {
        for (j, p_j) in pmf_a.iter().enumerate() {
            let p = p_i * p_j;
            if i > j {
                p_home += p;
            } else if i < j {
                p_away += p;
            } else {
                p_draw += p;
            }
        }
    }

    let sum = p_home + p_draw + p_away;
    if sum > 0.0 {
        (p_home / sum, p_draw / sum, p_away / sum)
    } else {
        (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0)
    }
}

fn poisson_pmf(lambda: f64, max_k: u32) -> Vec<f64> {
    let max_k = max_k as usize;
    let lambda = lambda.max(0.0);
    let mut out = vec![0.0; max_k + 1];

    out[0] = (-lambda).exp();
    for k in 1..=max_k {
        out[k] = out[k - 1] * lambda / k as f64;
    }

    let sum: f64 = out.iter().sum();
    if sum < 1.0 {
        out[max_k] += 1.0 - sum;
    }
    out
}

/// Integer percentages by cumulative rounding: round the running totals, not
/// the parts. Always sums to exactly 100 and home is monotone in `p_home`.
fn to_percentages(p_home: f64, p_draw: f64, p_away: f64) -> (u8, u8, u8) {
    let total = p_home + p_draw + p_away;
    let (p_home, p_draw) = if total > 0.0 {
        (p_home / total, p_draw / total)
    } else {
        (1.0 / 3.0, 1.0 / 3.0)
    };

    let home = (p_home * 100.0).round().clamp(0.0, 100.0) as u8;
    let home_draw = ((p_home + p_draw) * 100.0).round().clamp(home as f64, 100.0) as u8;
    (home, home_draw - home, 100 - home_draw)
}

/// 0 for a three-way even split, 100 for a certain outcome.
fn confidence(home: u8, draw: u8, away: u8) -> u8 {
    let top = home.max(draw).max(away) as f64;
    (1.5 * (top - 100.0 / 3.0)).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Standing;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn club(id: i64, position: u32, points: u32, played: u32) -> ClubStanding {
        let won = (points / 3).min(played);
        let drawn = (points - 3 * won).min(played - won);
        ClubStanding {
            club_id: id,
            display_name: format!("Club {}", id),
            standing: Standing {
                position,
                points,
                played,
                won,
                drawn,
                lost: played - won - drawn,
                goals_for: 30,
                goals_against: 30,
            },
        }
    }

    fn form(id: i64, points: u32) -> FormSample {
        FormSample {
            club_id: id,
            points,
            matches: 5,
        }
    }

    fn fixture() -> Fixture {
        Fixture {
            id: 100,
            home_club_id: 1,
            away_club_id: 2,
            match_date: Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap(),
            match_week: 27,
        }
    }

    fn assert_well_formed(f: &Forecast) {
        let sum = f.home_win_probability as u32 + f.draw_probability as u32 + f.away_win_probability as u32;
        assert_eq!(sum, 100, "probabilities must sum to 100: {:?}", f);
        assert!(f.confidence <= 100);
    }

    #[test]
    fn champion_in_form_beats_bottom_club_at_home() {
        let engine = PredictionEngine::default();
        let f = engine
            .forecast(&club(1, 1, 80, 30), &club(2, 20, 20, 30), &form(1, 15), &form(2, 2))
            .unwrap();
        assert_well_formed(&f);
        assert_eq!(f.predicted_outcome, Outcome::HomeWin);
        assert!(f.home_win_probability > 60, "got {}", f.home_win_probability);
        assert!(f.predicted_home_score > f.predicted_away_score);
    }

    #[test]
    fn identical_clubs_split_evenly_with_home_skew() {
        let engine = PredictionEngine::default();
        let f = engine
            .forecast(&club(1, 10, 40, 30), &club(2, 10, 40, 30), &form(1, 7), &form(2, 7))
            .unwrap();
        assert_well_formed(&f);
        assert!(f.home_win_probability > f.away_win_probability);
        assert!(f.home_win_probability - f.away_win_probability < 20);
        assert!(f.home_win_probability < 50);
        assert_ne!(f.predicted_outcome, Outcome::AwayWin);
        assert!(f.confidence < 20, "near-even split, got {}", f.confidence);
    }

    #[test]
    fn generate_is_deterministic() {
        let engine = PredictionEngine::default();
        let (h, a) = (club(1, 4, 55, 28), club(2, 9, 41, 28));
        let (hf, af) = (form(1, 9), form(2, 10));
        let first = engine
            .generate(&fixture(), Some(&h), Some(&a), Some(&hf), Some(&af))
            .unwrap();
        let second = engine
            .generate(&fixture(), Some(&h), Some(&a), Some(&hf), Some(&af))
            .unwrap();
        assert_eq!(first.forecast, second.forecast);
        assert_eq!(first.fixture_id, 100);
    }

    #[test]
    fn better_home_form_never_lowers_home_win_probability() {
        let engine = PredictionEngine::default();
        let away = club(2, 6, 48, 28);
        let away_form = form(2, 9);
        for home in [club(1, 12, 35, 28), club(1, 1, 70, 28), club(1, 20, 12, 28)] {
            let mut last = 0u8;
            for points in 0..=15 {
                let f = engine
                    .forecast(&home, &away, &form(1, points), &away_form)
                    .unwrap();
                assert!(
                    f.home_win_probability >= last,
                    "home form {} dropped home win to {} from {}",
                    points,
                    f.home_win_probability,
                    last
                );
                last = f.home_win_probability;
            }
        }
    }

    #[test]
    fn swapping_sides_and_home_advantage_swaps_probabilities() {
        let forward = PredictionEngine::default();
        let reversed = PredictionEngine::new(EngineParams {
            home_advantage: -forward.params.home_advantage,
            ..EngineParams::default()
        });
        let (a, b) = (club(1, 3, 58, 27), club(2, 14, 30, 27));
        let (af, bf) = (form(1, 11), form(2, 5));

        let f1 = forward.forecast(&a, &b, &af, &bf).unwrap();
        let f2 = reversed.forecast(&b, &a, &bf, &af).unwrap();

        assert!((f1.home_win_probability as i32 - f2.away_win_probability as i32).abs() <= 1);
        assert!((f1.away_win_probability as i32 - f2.home_win_probability as i32).abs() <= 1);
    }

    #[test]
    fn forecast_records_the_parameters_it_was_built_with() {
        let (h, a) = (club(1, 5, 45, 26), club(2, 11, 33, 26));
        let (hf, af) = (form(1, 8), form(2, 7));
        let base = PredictionEngine::default().forecast(&h, &a, &hf, &af).unwrap();
        let shifted = PredictionEngine::new(EngineParams {
            league_size: 18,
            ..EngineParams::default()
        })
        .forecast(&h, &a, &hf, &af)
        .unwrap();

        assert_eq!(base.model_key, EngineParams::default().model_key());
        assert_ne!(base.model_key, shifted.model_key);
    }

    #[test]
    fn missing_inputs_are_insufficient_data() {
        let engine = PredictionEngine::default();
        let (h, a) = (club(1, 4, 55, 28), club(2, 9, 41, 28));
        let (hf, af) = (form(1, 9), form(2, 10));

        let err = engine
            .generate(&fixture(), Some(&h), None, Some(&hf), Some(&af))
            .unwrap_err();
        assert!(matches!(
            err,
            PredictionError::InsufficientData { club_id: 2, missing: MissingData::Standing }
        ));

        let err = engine
            .generate(&fixture(), Some(&h), Some(&a), Some(&hf), None)
            .unwrap_err();
        assert!(matches!(
            err,
            PredictionError::InsufficientData { club_id: 2, missing: MissingData::Form }
        ));

        let empty = FormSample { club_id: 1, points: 0, matches: 0 };
        let err = engine
            .generate(&fixture(), Some(&h), Some(&a), Some(&empty), Some(&af))
            .unwrap_err();
        assert!(matches!(
            err,
            PredictionError::InsufficientData { club_id: 1, missing: MissingData::Form }
        ));
    }

    #[test]
    fn zero_games_played_is_rejected_not_divided() {
        let engine = PredictionEngine::default();
        let unplayed = club(1, 1, 0, 0);
        let err = engine
            .forecast(&unplayed, &club(2, 2, 10, 4), &form(1, 0), &form(2, 6))
            .unwrap_err();
        assert!(matches!(
            err,
            PredictionError::InsufficientData { club_id: 1, missing: MissingData::MatchesPlayed }
        ));
    }

    #[test]
    fn level_rounding_with_clear_favourite_is_tie_broken() {
        let engine = PredictionEngine::default();
        let (ph, pd, pa) = outcome_probs_poisson(1.49, 0.51, MAX_GOALS);
        let (h, _, a) = to_percentages(ph, pd, pa);
        assert!(h as i32 - a as i32 >= 20);
        let rounded = (round_goals(1.49), round_goals(0.51));
        assert_eq!(rounded, (1, 1));
        assert_eq!(engine.scoreline(rounded, h, a), (2, 1, true));

        assert_eq!(engine.scoreline((1, 1), 38, 32), (1, 1, false));
        assert_eq!(engine.scoreline((0, 0), 20, 45), (0, 1, true));
        assert_eq!(engine.scoreline((2, 0), 70, 10), (2, 0, false));
    }

    #[test]
    fn cumulative_rounding_sums_to_100() {
        assert_eq!(to_percentages(0.5, 0.25, 0.25), (50, 25, 25));
        assert_eq!(to_percentages(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0), (33, 34, 33));
        assert_eq!(to_percentages(0.0, 0.0, 0.0), (33, 34, 33));
        let (h, d, a) = to_percentages(0.4149, 0.2851, 0.3);
        assert_eq!(h as u32 + d as u32 + a as u32, 100);
    }

    #[test]
    fn confidence_tracks_probability_spread() {
        assert!(confidence(34, 33, 33) <= 1);
        assert_eq!(confidence(100, 0, 0), 100);
        assert!(confidence(70, 20, 10) > confidence(45, 30, 25));
    }

    #[test]
    fn poisson_pmf_is_a_distribution() {
        for lambda in [0.2, 1.3, 3.8] {
            let pmf = poisson_pmf(lambda, MAX_GOALS);
            assert_relative_eq!(pmf.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
            assert!(pmf.iter().all(|p| *p >= 0.0));
        }
    }

    #[test]
    fn every_table_combination_is_well_formed() {
        let engine = PredictionEngine::default();
        for hp in [1, 7, 14, 20] {
            for ap in [1, 7, 14, 20] {
                for hf in [0, 7, 15] {
                    for af in [0, 7, 15] {
                        let f = engine
                            .forecast(
                                &club(1, hp, 80 - 3 * hp, 30),
                                &club(2, ap, 80 - 3 * ap, 30),
                                &form(1, hf),
                                &form(2, af),
                            )
                            .unwrap();
                        assert_well_formed(&f);
                    }
                }
            }
        }
    }
}
