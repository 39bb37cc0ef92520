//! Recent-form sampling: points from a club's last N finished matches.

use crate::db::models::{FormSample, Match, MatchStatus};

/// Default number of matches in a form sample.
pub const DEFAULT_FORM_WINDOW: u32 = 5;

/// Build a form sample from `results`, which must be ordered newest first.
///
/// Only finished matches involving the club with both scores recorded count;
/// at most `window` of them are sampled, so points never exceed `3 * window`.
pub fn form_sample(club_id: i64, results: &[Match], window: u32) -> FormSample {
    let mut points = 0;
    let mut matches = 0;

    for (scored, conceded) in results
        .iter()
        .filter(|m| m.status == MatchStatus::Finished)
        .filter_map(|m| m.score_for(club_id))
        .take(window as usize)
    {
        matches += 1;
        points += match scored.cmp(&conceded) {
            std::cmp::Ordering::Greater => 3,
            std::cmp::Ordering::Equal => 1,
            std::cmp::Ordering::Less => 0,
        };
    }

    FormSample {
        club_id,
        points,
        matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn result(id: i64, home: i64, away: i64, score: Option<(u32, u32)>, days_ago: i64) -> Match {
        Match {
            id,
            home_club_id: home,
            away_club_id: away,
            match_date: Utc.with_ymd_and_hms(2024, 12, 1, 15, 0, 0).unwrap()
                - Duration::days(days_ago),
            match_week: 10,
            season: None,
            venue: None,
            status: MatchStatus::Finished,
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
        }
    }

    #[test]
    fn points_from_both_sides_of_the_fixture() {
        let results = vec![
            result(1, 1, 2, Some((2, 0)), 1), // home win
            result(2, 3, 1, Some((1, 1)), 8), // away draw
            result(3, 4, 1, Some((0, 2)), 15), // away win
            result(4, 1, 5, Some((0, 1)), 22), // home loss
        ];
        let form = form_sample(1, &results, 5);
        assert_eq!(form.points, 7);
        assert_eq!(form.matches, 4);
        assert_eq!(form.max_points(), 12);
    }

    #[test]
    fn window_caps_sample_at_most_recent_matches() {
        let results: Vec<Match> = (0..8)
            .map(|i| result(i, 1, 2, Some((3, 0)), i * 7))
            .collect();
        let form = form_sample(1, &results, 5);
        assert_eq!(form.matches, 5);
        assert_eq!(form.points, 15);
    }

    #[test]
    fn unscored_and_unfinished_matches_are_skipped() {
        let mut live = result(9, 1, 2, Some((1, 0)), 0);
        live.status = MatchStatus::InPlay;
        let results = vec![
            live,
            result(1, 1, 2, None, 3),
            result(2, 1, 3, Some((1, 0)), 10),
        ];
        let form = form_sample(1, &results, 5);
        assert_eq!(form.matches, 1);
        assert_eq!(form.points, 3);
    }

    #[test]
    fn no_results_means_empty_sample() {
        let form = form_sample(1, &[], 5);
        assert_eq!(form.matches, 0);
        assert_eq!(form.points, 0);
    }
}
