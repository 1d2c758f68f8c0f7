//! Entity kinds and business identity.
//!
//! Four entity kinds share the same versioning shape but carry different
//! attribute sets. A business identity is the natural key that survives
//! across versions; a player transferring teams (or a season rollover)
//! produces a *new* identity, never a new version of the old one.

use serde::{Deserialize, Serialize};
use strum::EnumIter;

use crate::{Error, Result};

// ─── EntityKind ──────────────────────────────────────────────────────────────

/// The four analytics entity kinds.
///
/// `Opponent` is the mirror view of `Squad`: the statistics a team *allows*
/// its opponents, keyed by the allowing team's own name.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Outfield,
  Goalkeeper,
  Squad,
  Opponent,
}

impl EntityKind {
  /// The analytics table this kind is stored in.
  pub fn table(&self) -> &'static str {
    match self {
      Self::Outfield => "players",
      Self::Goalkeeper => "keepers",
      Self::Squad => "squads",
      Self::Opponent => "opponents",
    }
  }

  /// Stable string form used in URLs, reports, and the run log.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Outfield => "outfield",
      Self::Goalkeeper => "goalkeeper",
      Self::Squad => "squad",
      Self::Opponent => "opponent",
    }
  }

  /// Parse a discriminant string (also accepts the table name).
  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "outfield" | "players" => Ok(Self::Outfield),
      "goalkeeper" | "keepers" => Ok(Self::Goalkeeper),
      "squad" | "squads" => Ok(Self::Squad),
      "opponent" | "opponents" => Ok(Self::Opponent),
      other => Err(Error::UnknownEntityKind(other.to_string())),
    }
  }

  /// Player-level kinds are identified by name + birth year; team-level
  /// kinds by team name alone.
  pub fn is_player(&self) -> bool {
    matches!(self, Self::Outfield | Self::Goalkeeper)
  }
}

// ─── Business identity ───────────────────────────────────────────────────────

/// Business key for a player-level entity: name, birth year, team, season.
///
/// A missing birth year collapses to `0` so two unknown-year homonyms on the
/// same team still merge rather than multiplying.
pub fn player_identity(
  name: &str,
  born: Option<i64>,
  team: &str,
  season: &str,
) -> String {
  format!("{name}_{}_{team}_{season}", born.unwrap_or(0))
}

/// Business key for a team-level entity (squad or opponent view).
pub fn team_identity(team: &str, season: &str) -> String {
  format!("{team}_{season}")
}
