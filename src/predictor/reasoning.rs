//! Human-readable rationale attached to every prediction.

use std::fmt::Write;

use crate::db::models::{ClubStanding, FormSample};

/// Form gap (points) worth calling out.
const FORM_GAP_NOTABLE: u32 = 4;
/// Table gap (places) worth calling out.
const POSITION_GAP_NOTABLE: u32 = 5;

pub struct RationaleInput<'a> {
    pub home: &'a ClubStanding,
    pub away: &'a ClubStanding,
    pub home_form: &'a FormSample,
    pub away_form: &'a FormSample,
    pub home_advantage: f64,
    pub expected_goals: (f64, f64),
    pub rounded_score: (u32, u32),
    pub final_score: (u32, u32),
    pub adjusted: bool,
}

pub fn rationale(input: &RationaleInput<'_>) -> String {
    let home = input.home.display_name.as_str();
    let away = input.away.display_name.as_str();
    let home_pos = input.home.standing.position;
    let away_pos = input.away.standing.position;
    let home_form = input.home_form.points;
    let away_form = input.away_form.points;

    // Writing into a String cannot fail.
    let mut out = String::new();
    let _ = write!(out, "{} ({}) vs {} ({}). ", home, home_pos, away, away_pos);
    let _ = write!(
        out,
        "Recent form: {} ({}/{} pts), {} ({}/{} pts). ",
        home,
        home_form,
        input.home_form.max_points(),
        away,
        away_form,
        input.away_form.max_points()
    );

    if home_form > away_form + FORM_GAP_NOTABLE {
        let _ = write!(out, "{}'s stronger recent form is the main factor. ", home);
    } else if away_form > home_form + FORM_GAP_NOTABLE {
        let _ = write!(out, "{}'s superior form could overcome home advantage. ", away);
    } else {
        out.push_str("Both teams in similar form. ");
    }

    if home_pos.abs_diff(away_pos) > POSITION_GAP_NOTABLE {
        if home_pos < away_pos {
            let _ = write!(
                out,
                "{} sit {} places higher in the table. ",
                home,
                away_pos - home_pos
            );
        } else {
            let _ = write!(
                out,
                "{}'s superior league standing ({} places higher) cannot be ignored. ",
                away,
                home_pos - away_pos
            );
        }
    }

    if input.home_advantage > 0.0 {
        let _ = write!(
            out,
            "Home advantage is worth about {:.1} goals to {}. ",
            input.home_advantage, home
        );
    }

    let (xg_home, xg_away) = input.expected_goals;
    let _ = write!(out, "Expected goals {:.2}-{:.2}.", xg_home, xg_away);

    if input.adjusted {
        let (rh, ra) = input.rounded_score;
        let (fh, fa) = input.final_score;
        let favourite = if fh > fa { home } else { away };
        let _ = write!(
            out,
            " Level scoreline {}-{} moved to {}-{} because {} are clear favourites.",
            rh, ra, fh, fa, favourite
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Standing;

    fn standing(id: i64, name: &str, position: u32) -> ClubStanding {
        ClubStanding {
            club_id: id,
            display_name: name.to_string(),
            standing: Standing {
                position,
                points: 30,
                played: 20,
                won: 9,
                drawn: 3,
                lost: 8,
                goals_for: 25,
                goals_against: 24,
            },
        }
    }

    fn sample(id: i64, points: u32) -> FormSample {
        FormSample {
            club_id: id,
            points,
            matches: 5,
        }
    }

    #[test]
    fn cites_form_position_and_home_advantage() {
        let (h, a) = (standing(1, "Arsenal", 2), standing(2, "Luton", 18));
        let (hf, af) = (sample(1, 13), sample(2, 3));
        let text = rationale(&RationaleInput {
            home: &h,
            away: &a,
            home_form: &hf,
            away_form: &af,
            home_advantage: 0.3,
            expected_goals: (2.1, 0.5),
            rounded_score: (2, 1),
            final_score: (2, 1),
            adjusted: false,
        });
        assert_eq!(
            text,
            "Arsenal (2) vs Luton (18). Recent form: Arsenal (13/15 pts), Luton (3/15 pts). \
             Arsenal's stronger recent form is the main factor. \
             Arsenal sit 16 places higher in the table. \
             Home advantage is worth about 0.3 goals to Arsenal. \
             Expected goals 2.10-0.50."
        );
    }

    #[test]
    fn documents_scoreline_tie_break() {
        let (h, a) = (standing(1, "Home", 8), standing(2, "Away", 6));
        let (hf, af) = (sample(1, 7), sample(2, 8));
        let text = rationale(&RationaleInput {
            home: &h,
            away: &a,
            home_form: &hf,
            away_form: &af,
            home_advantage: 0.0,
            expected_goals: (0.6, 1.4),
            rounded_score: (1, 1),
            final_score: (1, 2),
            adjusted: true,
        });
        assert!(text.contains("Both teams in similar form."));
        assert!(!text.contains("places higher"));
        assert!(!text.contains("Home advantage"));
        assert!(text.ends_with("Level scoreline 1-1 moved to 1-2 because Away are clear favourites."));
    }
}
