//! The update planner.
//!
//! Decides, per team, whether downstream records are stale. "No delta
//! detected" is ambiguous — it may mean nothing changed, or that ingestion
//! silently failed — so two escalation paths convert that ambiguity into an
//! explicit upstream re-fetch instead of either always re-fetching
//! (wasteful) or trusting stale data (incorrect).
//!
//! The planner is a pure function of its inputs; the engine owns the
//! re-fetch side effects and re-plans at most once after an escalation.

use std::{collections::BTreeSet, fmt};

use chrono::Duration;
use terrace_core::fixture::TeamProgress;

// ─── Inputs ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PlannerInput<'a> {
  /// The analytical store holds no rows at all.
  pub analytics_empty:    bool,
  /// Per-team progress derived from the source fixture ledger.
  pub source_progress:    &'a TeamProgress,
  /// Per-team progress currently reflected downstream.
  pub analytics_progress: &'a TeamProgress,
  /// A fixture recorded incomplete locally turned out completed when
  /// re-queried upstream.
  pub newly_completed:    bool,
  /// Base source tables entirely absent from the source store.
  pub tables_absent:      Vec<String>,
  /// Age of the source store's last completed refresh; `None` when unknown.
  pub source_age:         Option<Duration>,
  pub staleness_threshold: Duration,
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationReason {
  FixturesCompletedUpstream,
  SourceTablesAbsent(Vec<String>),
  /// Absence of new completed fixtures past the threshold may itself mean a
  /// failed refresh rather than a quiet week.
  SourceStale { age_hours: i64 },
}

impl fmt::Display for EscalationReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::FixturesCompletedUpstream => {
        write!(f, "incomplete fixtures completed upstream")
      }
      Self::SourceTablesAbsent(tables) => {
        write!(f, "source tables absent: {}", tables.join(", "))
      }
      Self::SourceStale { age_hours } => {
        write!(f, "source store {age_hours}h since last refresh")
      }
    }
  }
}

/// The planner's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
  /// Empty analytical store: refresh every team the ledger knows.
  Bootstrap(BTreeSet<String>),
  /// These teams have newer completed fixtures than their downstream rows.
  Update(BTreeSet<String>),
  /// Full upstream re-fetch required before the plan can be trusted.
  Escalate(EscalationReason),
  /// The expected steady state: nothing to do.
  Noop,
}

impl Plan {
  pub fn selected_teams(&self) -> BTreeSet<String> {
    match self {
      Self::Bootstrap(teams) | Self::Update(teams) => teams.clone(),
      Self::Escalate(_) | Self::Noop => BTreeSet::new(),
    }
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Evaluate the layered refresh policy.
///
/// Escalations supersede accumulated per-team deltas: the re-fetch they
/// trigger is followed by a re-plan, which rediscovers any genuine deltas
/// against fresher data.
pub fn plan(input: &PlannerInput<'_>) -> Plan {
  // 1. Full bootstrap when nothing exists downstream yet.
  if input.analytics_empty {
    return Plan::Bootstrap(input.source_progress.keys().cloned().collect());
  }

  // 2. Accumulate per-team deltas. Absent downstream progress counts as 0.
  let mut selected = BTreeSet::new();
  for (team, &source) in input.source_progress {
    let downstream =
      input.analytics_progress.get(team).copied().unwrap_or(0);
    if source > downstream {
      selected.insert(team.clone());
    }
  }

  // 3. Upstream moved ahead of the local source store.
  if input.newly_completed {
    return Plan::Escalate(EscalationReason::FixturesCompletedUpstream);
  }
  if !input.tables_absent.is_empty() {
    return Plan::Escalate(EscalationReason::SourceTablesAbsent(
      input.tables_absent.clone(),
    ));
  }

  // 4. A source store this old may mean the refresh itself failed.
  if let Some(age) = input.source_age
    && age > input.staleness_threshold
  {
    return Plan::Escalate(EscalationReason::SourceStale {
      age_hours: age.num_hours(),
    });
  }

  if selected.is_empty() { Plan::Noop } else { Plan::Update(selected) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn progress(entries: &[(&str, u32)]) -> TeamProgress {
    entries
      .iter()
      .map(|(team, gw)| (team.to_string(), *gw))
      .collect()
  }

  fn input<'a>(
    source: &'a TeamProgress,
    analytics: &'a TeamProgress,
  ) -> PlannerInput<'a> {
    PlannerInput {
      analytics_empty: false,
      source_progress: source,
      analytics_progress: analytics,
      newly_completed: false,
      tables_absent: Vec::new(),
      source_age: Some(Duration::hours(1)),
      staleness_threshold: Duration::hours(24),
    }
  }

  #[test]
  fn empty_store_bootstraps_every_known_team() {
    let source = progress(&[("A", 2), ("B", 1)]);
    let analytics = progress(&[]);
    let mut i = input(&source, &analytics);
    i.analytics_empty = true;

    let Plan::Bootstrap(teams) = plan(&i) else {
      panic!("expected bootstrap");
    };
    assert_eq!(teams.len(), 2);
  }

  #[test]
  fn selects_only_teams_with_newer_source_progress() {
    let source = progress(&[("A", 2), ("B", 1)]);
    let analytics = progress(&[("A", 1), ("B", 1)]);

    let p = plan(&input(&source, &analytics));
    assert_eq!(
      p,
      Plan::Update(["A".to_string()].into_iter().collect()),
    );
  }

  #[test]
  fn team_absent_downstream_counts_as_zero() {
    let source = progress(&[("A", 1)]);
    let analytics = progress(&[]);

    let p = plan(&input(&source, &analytics));
    assert_eq!(p.selected_teams().len(), 1);
  }

  #[test]
  fn no_deltas_is_a_noop() {
    let source = progress(&[("A", 2), ("B", 1)]);
    let analytics = progress(&[("A", 2), ("B", 1)]);
    assert_eq!(plan(&input(&source, &analytics)), Plan::Noop);
  }

  #[test]
  fn newly_completed_fixture_escalates_even_with_deltas() {
    let source = progress(&[("A", 2)]);
    let analytics = progress(&[("A", 1)]);
    let mut i = input(&source, &analytics);
    i.newly_completed = true;

    assert_eq!(
      plan(&i),
      Plan::Escalate(EscalationReason::FixturesCompletedUpstream),
    );
  }

  #[test]
  fn absent_tables_escalate() {
    let source = progress(&[("A", 1)]);
    let analytics = progress(&[("A", 1)]);
    let mut i = input(&source, &analytics);
    i.tables_absent = vec!["player_shooting".to_string()];

    assert!(matches!(
      plan(&i),
      Plan::Escalate(EscalationReason::SourceTablesAbsent(_)),
    ));
  }

  #[test]
  fn stale_source_escalates_when_quiet() {
    let source = progress(&[("A", 1)]);
    let analytics = progress(&[("A", 1)]);
    let mut i = input(&source, &analytics);
    i.source_age = Some(Duration::hours(30));

    assert_eq!(
      plan(&i),
      Plan::Escalate(EscalationReason::SourceStale { age_hours: 30 }),
    );
  }

  #[test]
  fn unknown_source_age_does_not_escalate() {
    let source = progress(&[("A", 1)]);
    let analytics = progress(&[("A", 1)]);
    let mut i = input(&source, &analytics);
    i.source_age = None;

    assert_eq!(plan(&i), Plan::Noop);
  }

  #[test]
  fn analytics_ahead_of_source_is_left_alone() {
    // A source rollback must never retire newer downstream versions.
    let source = progress(&[("A", 1)]);
    let analytics = progress(&[("A", 2)]);
    assert_eq!(plan(&input(&source, &analytics)), Plan::Noop);
  }
}
