//! Fixtures and the fixture ledger.
//!
//! The ledger is the authority on per-team progress: each team's version
//! number is the highest match index among its *completed* fixtures. Two
//! teams legitimately sit at different progress values at the same moment —
//! there is no global "current gameweek" anywhere in this system.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Per-team progress: team name → highest completed match index.
///
/// Teams with no completed fixture are *absent*, which callers must treat as
/// "no data yet" — distinct from progress 0.
pub type TeamProgress = BTreeMap<String, u32>;

// ─── Fixture ─────────────────────────────────────────────────────────────────

/// One scheduled match, as delivered by the scraping collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
  /// The match index ("gameweek") this fixture belongs to.
  pub gameweek:     u32,
  pub match_date:   Option<NaiveDate>,
  pub home_team:    String,
  pub away_team:    String,
  pub home_score:   Option<u32>,
  pub away_score:   Option<u32>,
  pub home_xg:      Option<f64>,
  pub away_xg:      Option<f64>,
  pub is_completed: bool,
}

impl Fixture {
  /// The season this fixture falls in, when it carries a date.
  pub fn season(&self) -> Option<String> {
    self.match_date.map(season_for_date)
  }
}

/// Seasons run August to May: an August-or-later date starts a season, an
/// earlier date ends the previous one.
pub fn season_for_date(date: NaiveDate) -> String {
  let year = date.year();
  if date.month() >= 8 {
    format!("{year}-{}", year + 1)
  } else {
    format!("{}-{year}", year - 1)
  }
}

// ─── FixtureLedger ───────────────────────────────────────────────────────────

/// A read-only view over the flat fixture list.
#[derive(Debug, Clone)]
pub struct FixtureLedger {
  fixtures: Vec<Fixture>,
}

impl FixtureLedger {
  pub fn new(fixtures: Vec<Fixture>) -> Self { Self { fixtures } }

  pub fn fixtures(&self) -> &[Fixture] { &self.fixtures }

  pub fn is_empty(&self) -> bool { self.fixtures.is_empty() }

  /// Highest completed match index per participating team.
  pub fn team_progress(&self) -> TeamProgress {
    let mut progress = TeamProgress::new();
    for f in self.fixtures.iter().filter(|f| f.is_completed) {
      for team in [&f.home_team, &f.away_team] {
        let entry = progress.entry(team.clone()).or_insert(f.gameweek);
        if f.gameweek > *entry {
          *entry = f.gameweek;
        }
      }
    }
    progress
  }

  /// Fixtures not yet completed in the local source store. The planner
  /// re-queries these upstream to detect progress that has not landed yet.
  pub fn incomplete(&self) -> Vec<Fixture> {
    self
      .fixtures
      .iter()
      .filter(|f| !f.is_completed)
      .cloned()
      .collect()
  }

  /// The highest match index seen anywhere in the ledger, completed or not.
  pub fn max_known_gameweek(&self) -> Option<u32> {
    self.fixtures.iter().map(|f| f.gameweek).max()
  }

  /// The season most fixtures fall in. Ties resolve to the later season.
  pub fn season(&self) -> Option<String> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for f in &self.fixtures {
      if let Some(season) = f.season() {
        *counts.entry(season).or_insert(0) += 1;
      }
    }
    counts
      .into_iter()
      .max_by(|(sa, ca), (sb, cb)| ca.cmp(cb).then(sa.cmp(sb)))
      .map(|(season, _)| season)
  }
}

// ─── Derived match analysis ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
  HomeWin,
  AwayWin,
  Draw,
  NotPlayed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalClassification {
  Goalless,
  LowScoring,
  MediumScoring,
  HighScoring,
  NotPlayed,
}

/// Analysis fields derived from a fixture's result, persisted alongside the
/// fixture in the analytical store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureAnalysis {
  pub outcome:              MatchOutcome,
  /// The winning team's name; `None` for draws and unplayed matches.
  pub winner:               Option<String>,
  pub home_points:          Option<u8>,
  pub away_points:          Option<u8>,
  pub home_goal_difference: Option<i64>,
  pub away_goal_difference: Option<i64>,
  pub total_goals:          Option<u32>,
  pub home_xg_difference:   Option<f64>,
  pub goal_classification:  GoalClassification,
  pub home_clean_sheet:     Option<bool>,
  pub away_clean_sheet:     Option<bool>,
  /// Decided matches are "competitive" when the xG margin is at most 0.8,
  /// falling back to a score margin of at most 1 when xG is missing.
  pub competitive:          Option<bool>,
}

impl Fixture {
  pub fn analysis(&self) -> FixtureAnalysis {
    let scores = match (self.is_completed, self.home_score, self.away_score) {
      (true, Some(h), Some(a)) => Some((h as i64, a as i64)),
      _ => None,
    };

    let outcome = match scores {
      None => MatchOutcome::NotPlayed,
      Some((h, a)) if h > a => MatchOutcome::HomeWin,
      Some((h, a)) if a > h => MatchOutcome::AwayWin,
      Some(_) => MatchOutcome::Draw,
    };

    let winner = match outcome {
      MatchOutcome::HomeWin => Some(self.home_team.clone()),
      MatchOutcome::AwayWin => Some(self.away_team.clone()),
      _ => None,
    };

    let (home_points, away_points) = match outcome {
      MatchOutcome::HomeWin => (Some(3), Some(0)),
      MatchOutcome::AwayWin => (Some(0), Some(3)),
      MatchOutcome::Draw => (Some(1), Some(1)),
      MatchOutcome::NotPlayed => (None, None),
    };

    let goal_classification = match scores {
      None => GoalClassification::NotPlayed,
      Some((h, a)) => match h + a {
        0 => GoalClassification::Goalless,
        1..=2 => GoalClassification::LowScoring,
        3..=4 => GoalClassification::MediumScoring,
        _ => GoalClassification::HighScoring,
      },
    };

    let home_xg_difference = match (self.home_xg, self.away_xg) {
      (Some(h), Some(a)) => Some(h - a),
      _ => None,
    };

    let competitive = if !self.is_completed {
      None
    } else if let Some(diff) = home_xg_difference {
      Some(diff.abs() <= 0.8)
    } else {
      scores.map(|(h, a)| (h - a).abs() <= 1)
    };

    FixtureAnalysis {
      outcome,
      winner,
      home_points,
      away_points,
      home_goal_difference: scores.map(|(h, a)| h - a),
      away_goal_difference: scores.map(|(h, a)| a - h),
      total_goals: scores.map(|(h, a)| (h + a) as u32),
      home_xg_difference,
      goal_classification,
      home_clean_sheet: scores.map(|(_, a)| a == 0),
      away_clean_sheet: scores.map(|(h, _)| h == 0),
      competitive,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fixture(
    gameweek: u32,
    home: &str,
    away: &str,
    completed: bool,
  ) -> Fixture {
    Fixture {
      gameweek,
      match_date: None,
      home_team: home.to_string(),
      away_team: away.to_string(),
      home_score: completed.then_some(2),
      away_score: completed.then_some(1),
      home_xg: None,
      away_xg: None,
      is_completed: completed,
    }
  }

  #[test]
  fn progress_only_counts_completed_fixtures() {
    let ledger = FixtureLedger::new(vec![
      fixture(1, "A", "B", true),
      fixture(2, "A", "C", false),
    ]);

    let progress = ledger.team_progress();
    assert_eq!(progress.get("A"), Some(&1));
    assert_eq!(progress.get("B"), Some(&1));
    // C has no completed fixture: absent, not zero.
    assert!(!progress.contains_key("C"));
  }

  #[test]
  fn progress_is_per_team() {
    let ledger = FixtureLedger::new(vec![
      fixture(1, "A", "B", true),
      fixture(2, "A", "C", true),
      fixture(2, "B", "D", false),
    ]);

    let progress = ledger.team_progress();
    assert_eq!(progress.get("A"), Some(&2));
    assert_eq!(progress.get("B"), Some(&1));
    assert_eq!(progress.get("C"), Some(&2));
    assert!(!progress.contains_key("D"));
  }

  #[test]
  fn max_known_gameweek_includes_incomplete() {
    let ledger = FixtureLedger::new(vec![
      fixture(3, "A", "B", true),
      fixture(7, "C", "D", false),
    ]);
    assert_eq!(ledger.max_known_gameweek(), Some(7));
    assert_eq!(ledger.incomplete().len(), 1);
  }

  #[test]
  fn season_boundary_is_august() {
    let may = NaiveDate::from_ymd_opt(2025, 5, 25).unwrap();
    let august = NaiveDate::from_ymd_opt(2025, 8, 16).unwrap();
    assert_eq!(season_for_date(may), "2024-2025");
    assert_eq!(season_for_date(august), "2025-2026");
  }

  #[test]
  fn analysis_of_decided_match() {
    let mut f = fixture(1, "A", "B", true);
    f.home_score = Some(3);
    f.away_score = Some(0);
    let a = f.analysis();

    assert_eq!(a.outcome, MatchOutcome::HomeWin);
    assert_eq!(a.winner.as_deref(), Some("A"));
    assert_eq!(a.home_points, Some(3));
    assert_eq!(a.away_points, Some(0));
    assert_eq!(a.home_goal_difference, Some(3));
    assert_eq!(a.total_goals, Some(3));
    assert_eq!(a.goal_classification, GoalClassification::MediumScoring);
    assert_eq!(a.home_clean_sheet, Some(true));
    assert_eq!(a.away_clean_sheet, Some(false));
    // No xG: competitiveness falls back to score margin.
    assert_eq!(a.competitive, Some(false));
  }

  #[test]
  fn analysis_prefers_xg_for_competitiveness() {
    let mut f = fixture(1, "A", "B", true);
    f.home_score = Some(2);
    f.away_score = Some(0);
    f.home_xg = Some(1.4);
    f.away_xg = Some(1.1);
    // A two-goal margin but near-equal xG: still competitive.
    assert_eq!(f.analysis().competitive, Some(true));
  }

  #[test]
  fn analysis_of_unplayed_match_is_empty() {
    let a = fixture(1, "A", "B", false).analysis();
    assert_eq!(a.outcome, MatchOutcome::NotPlayed);
    assert_eq!(a.goal_classification, GoalClassification::NotPlayed);
    assert!(a.winner.is_none());
    assert!(a.home_points.is_none());
    assert!(a.total_goals.is_none());
    assert!(a.competitive.is_none());
  }
}
