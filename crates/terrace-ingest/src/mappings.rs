//! The column mapping registry.
//!
//! Source tables arrive with ambiguous, source-specific column headers
//! ("Performance Gls", "Per 90 Minutes xG", …). Every mapping to a canonical
//! analytics column is declared statically here, per `(role, category)`
//! pair, so identical source fields always land in the same destination
//! column across entity kinds and merges can never collide silently.
//!
//! Squad mappings are derived from the player dictionaries (player-only
//! identity columns dropped, `Squad` renamed to `squad_name`); opponent
//! tables are structurally identical to squad tables and share their
//! mappings.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use terrace_core::{entity::EntityKind, report::MappingIssues};

use crate::{Error, Result};

// ─── Table naming ────────────────────────────────────────────────────────────

/// Which upstream table family a role draws from. Outfield players and
/// goalkeepers both read the `player_*` tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFamily {
  Player,
  Squad,
  Opponent,
}

impl TableFamily {
  pub fn prefix(&self) -> &'static str {
    match self {
      Self::Player => "player",
      Self::Squad => "squad",
      Self::Opponent => "opponent",
    }
  }

  pub fn for_role(role: EntityKind) -> Self {
    match role {
      EntityKind::Outfield | EntityKind::Goalkeeper => Self::Player,
      EntityKind::Squad => Self::Squad,
      EntityKind::Opponent => Self::Opponent,
    }
  }
}

/// One scraped statistics category; each becomes one narrow source table
/// per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatCategory {
  Standard,
  Shooting,
  Passing,
  PassingTypes,
  GoalShotCreation,
  Defense,
  Possession,
  Misc,
  Keepers,
  KeepersAdv,
}

impl StatCategory {
  pub fn suffix(&self) -> &'static str {
    match self {
      Self::Standard => "standard",
      Self::Shooting => "shooting",
      Self::Passing => "passing",
      Self::PassingTypes => "passingtypes",
      Self::GoalShotCreation => "goalshotcreation",
      Self::Defense => "defense",
      Self::Possession => "possession",
      Self::Misc => "misc",
      Self::Keepers => "keepers",
      Self::KeepersAdv => "keepersadv",
    }
  }
}

/// Source table name for a family/category pair, e.g. `player_shooting`.
pub fn source_table_name(family: TableFamily, category: StatCategory) -> String {
  format!("{}_{}", family.prefix(), category.suffix())
}

/// The categories a role consolidates, base table first. The two player
/// roles draw from disjoint auxiliary sets — a record must never receive
/// auxiliary columns from the wrong role's tables.
pub fn role_categories(role: EntityKind) -> &'static [StatCategory] {
  use StatCategory::*;
  match role {
    EntityKind::Outfield => &[
      Standard,
      Shooting,
      Passing,
      PassingTypes,
      GoalShotCreation,
      Defense,
      Possession,
      Misc,
    ],
    EntityKind::Goalkeeper => &[Standard, Keepers, KeepersAdv],
    EntityKind::Squad | EntityKind::Opponent => &[
      Standard,
      Shooting,
      Passing,
      PassingTypes,
      GoalShotCreation,
      Defense,
      Possession,
      Misc,
      Keepers,
      KeepersAdv,
    ],
  }
}

// ─── Declared mappings ───────────────────────────────────────────────────────

type StaticMap = &'static [(&'static str, &'static str)];

/// Outfield base table. The primary source for stats that also appear in
/// the narrow tables (goals, xG, progression, cards) — those duplicates are
/// deliberately *not* declared in the other tables.
const OUTFIELD_STANDARD: StaticMap = &[
  ("Player", "player_name"),
  ("Nation", "nation"),
  ("Pos", "position"),
  ("Squad", "squad"),
  ("Age", "age"),
  ("Born", "born_year"),
  ("Playing Time MP", "matches_played"),
  ("Playing Time Starts", "starts"),
  ("Playing Time Min", "minutes_played"),
  ("Playing Time 90s", "minutes_90s"),
  ("Performance Gls", "goals"),
  ("Performance Ast", "assists"),
  ("Performance G+A", "goals_plus_assists"),
  ("Performance G-PK", "non_penalty_goals"),
  ("Performance PK", "penalty_kicks_made"),
  ("Performance PKatt", "penalty_kicks_attempted"),
  ("Per 90 Minutes Gls", "goals_per_90"),
  ("Per 90 Minutes Ast", "assists_per_90"),
  ("Per 90 Minutes G+A", "goals_plus_assists_per_90"),
  ("Per 90 Minutes G-PK", "non_penalty_goals_per_90"),
  ("Per 90 Minutes G+A-PK", "goals_plus_assists_minus_pks_per_90"),
  ("Expected xG", "expected_goals"),
  ("Expected npxG", "non_penalty_expected_goals"),
  ("Expected xAG", "expected_assisted_goals"),
  ("Expected npxG+xAG", "non_penalty_xg_plus_xag"),
  ("Per 90 Minutes xG", "expected_goals_per_90"),
  ("Per 90 Minutes xAG", "expected_assisted_goals_per_90"),
  ("Per 90 Minutes xG+xAG", "xg_plus_xag_per_90"),
  ("Per 90 Minutes npxG", "non_penalty_xg_per_90"),
  ("Per 90 Minutes npxG+xAG", "non_penalty_xg_plus_xag_per_90"),
  ("Progression PrgC", "progressive_carries"),
  ("Progression PrgP", "progressive_passes"),
  ("Performance CrdY", "yellow_cards"),
  ("Performance CrdR", "red_cards"),
];

const OUTFIELD_SHOOTING: StaticMap = &[
  ("Standard Sh", "shots"),
  ("Standard SoT", "shots_on_target"),
  ("Standard SoT%", "shot_accuracy"),
  ("Standard Sh/90", "shots_per_90"),
  ("Standard SoT/90", "shots_on_target_per_90"),
  ("Standard G/Sh", "goals_per_shot"),
  ("Standard G/SoT", "goals_per_shot_on_target"),
  ("Standard Dist", "average_shot_distance"),
  ("Standard FK", "free_kick_shots"),
  ("Expected G-xG", "goals_minus_expected"),
  ("Expected np:G-xG", "non_penalty_goals_minus_expected"),
];

const OUTFIELD_PASSING: StaticMap = &[
  ("Total Cmp", "passes_completed"),
  ("Total Att", "passes_attempted"),
  ("Total Cmp%", "pass_completion_rate"),
  ("Total TotDist", "total_pass_distance"),
  ("Total PrgDist", "progressive_pass_distance"),
  ("Short Cmp", "short_passes_completed"),
  ("Short Att", "short_passes_attempted"),
  ("Short Cmp%", "short_pass_completion_rate"),
  ("Medium Cmp", "medium_passes_completed"),
  ("Medium Att", "medium_passes_attempted"),
  ("Medium Cmp%", "medium_pass_completion_rate"),
  ("Long Cmp", "long_passes_completed"),
  ("Long Att", "long_passes_attempted"),
  ("Long Cmp%", "long_pass_completion_rate"),
  ("Ast", "assists_passing"),
  ("xA", "expected_assists"),
  ("A-xAG", "assists_minus_expected"),
  ("KP", "key_passes"),
  ("1/3", "passes_final_third"),
  ("PPA", "passes_penalty_area"),
  ("CrsPA", "crosses_penalty_area"),
];

const OUTFIELD_PASSING_TYPES: StaticMap = &[
  ("Pass Types Live", "live_ball_passes"),
  ("Pass Types Dead", "dead_ball_passes"),
  ("Pass Types FK", "free_kick_passes"),
  ("Pass Types TB", "through_balls"),
  ("Pass Types Sw", "switches"),
  ("Pass Types Crs", "crosses"),
  ("Pass Types TI", "throw_ins"),
  ("Pass Types CK", "corner_kicks"),
  ("Corner Kicks In", "inswinging_corners"),
  ("Corner Kicks Out", "outswinging_corners"),
  ("Corner Kicks Str", "straight_corners"),
  ("Outcomes Cmp", "completed_passes_types"),
  ("Outcomes Off", "offsides_pass_types"),
  ("Outcomes Blocks", "blocked_passes"),
];

const OUTFIELD_GOAL_SHOT_CREATION: StaticMap = &[
  ("SCA SCA", "shot_creating_actions"),
  ("SCA SCA90", "shot_creating_actions_per_90"),
  ("SCA Types PassLive", "sca_pass_live"),
  ("SCA Types PassDead", "sca_pass_dead"),
  ("SCA Types TO", "sca_take_on"),
  ("SCA Types Sh", "sca_shot"),
  ("SCA Types Fld", "sca_fouled"),
  ("SCA Types Def", "sca_defense"),
  ("GCA GCA", "goal_creating_actions"),
  ("GCA GCA90", "goal_creating_actions_per_90"),
  ("GCA Types PassLive", "gca_pass_live"),
  ("GCA Types PassDead", "gca_pass_dead"),
  ("GCA Types TO", "gca_take_on"),
  ("GCA Types Sh", "gca_shot"),
  ("GCA Types Fld", "gca_fouled"),
  ("GCA Types Def", "gca_defense"),
];

const OUTFIELD_DEFENSE: StaticMap = &[
  ("Tackles Tkl", "tackles"),
  ("Tackles TklW", "tackles_won"),
  ("Tackles Def 3rd", "tackles_def_third"),
  ("Tackles Mid 3rd", "tackles_mid_third"),
  ("Tackles Att 3rd", "tackles_att_third"),
  ("Challenges Tkl", "challenge_tackles"),
  ("Challenges Att", "challenges_attempted"),
  ("Challenges Tkl%", "tackle_success_rate"),
  ("Challenges Lost", "challenges_lost"),
  ("Blocks Blocks", "blocks"),
  ("Blocks Sh", "shots_blocked"),
  ("Blocks Pass", "passes_blocked"),
  ("Int", "interceptions"),
  ("Tkl+Int", "tackles_plus_interceptions"),
  ("Clr", "clearances"),
  ("Err", "errors"),
];

const OUTFIELD_POSSESSION: StaticMap = &[
  ("Touches Touches", "touches"),
  ("Touches Def Pen", "touches_def_penalty"),
  ("Touches Def 3rd", "touches_def_third"),
  ("Touches Mid 3rd", "touches_mid_third"),
  ("Touches Att 3rd", "touches_att_third"),
  ("Touches Att Pen", "touches_att_penalty"),
  ("Touches Live", "touches_live_ball"),
  ("Take-Ons Att", "take_ons_attempted"),
  ("Take-Ons Succ", "take_ons_successful"),
  ("Take-Ons Succ%", "take_on_success_rate"),
  ("Take-Ons Tkld", "take_ons_tackled"),
  ("Take-Ons Tkld%", "take_ons_tackled_rate"),
  ("Carries Carries", "carries"),
  ("Carries TotDist", "carry_distance"),
  ("Carries PrgDist", "progressive_carry_distance"),
  ("Carries 1/3", "carries_final_third"),
  ("Carries CPA", "carries_penalty_area"),
  ("Carries Mis", "miscontrols"),
  ("Carries Dis", "dispossessed"),
  ("Receiving Rec", "passes_received"),
  ("Receiving PrgR", "progressive_passes_received_detail"),
];

const OUTFIELD_MISC: StaticMap = &[
  ("Performance 2CrdY", "second_yellow_cards"),
  ("Performance Fls", "fouls_committed"),
  ("Performance Fld", "fouls_drawn"),
  ("Performance Off", "offsides"),
  ("Performance Crs", "crosses_misc"),
  ("Performance PKwon", "penalty_kicks_won"),
  ("Performance PKcon", "penalty_kicks_conceded"),
  ("Performance OG", "own_goals"),
  ("Performance Recov", "ball_recoveries"),
  ("Aerial Duels Won", "aerial_duels_won"),
  ("Aerial Duels Lost", "aerial_duels_lost"),
  ("Aerial Duels Won%", "aerial_duel_success_rate"),
];

/// Goalkeeper view of the base table: the shared core stats only.
const GOALKEEPER_STANDARD: StaticMap = &[
  ("Player", "player_name"),
  ("Nation", "nation"),
  ("Pos", "position"),
  ("Squad", "squad"),
  ("Age", "age"),
  ("Born", "born_year"),
  ("Playing Time MP", "matches_played"),
  ("Playing Time Starts", "starts"),
  ("Playing Time Min", "minutes_played"),
  ("Playing Time 90s", "minutes_90s"),
  ("Performance Gls", "goals"),
  ("Performance Ast", "assists"),
  ("Performance CrdY", "yellow_cards"),
  ("Performance CrdR", "red_cards"),
  ("Expected xG", "expected_goals"),
  ("Expected npxG", "non_penalty_expected_goals"),
];

const GOALKEEPER_KEEPERS: StaticMap = &[
  ("Performance GA", "goals_against"),
  ("Performance GA90", "goals_against_per_90"),
  ("Performance SoTA", "shots_on_target_against"),
  ("Performance Saves", "saves"),
  ("Performance Save%", "save_percentage"),
  ("Performance W", "wins"),
  ("Performance D", "draws"),
  ("Performance L", "losses"),
  ("Performance CS", "clean_sheets"),
  ("Performance CS%", "clean_sheet_percentage"),
  ("Penalty Kicks PKatt", "penalty_kicks_attempted_against"),
  ("Penalty Kicks PKA", "penalty_kicks_against"),
  ("Penalty Kicks PKsv", "penalty_kicks_saved"),
  ("Penalty Kicks PKm", "penalty_kicks_missed_by_opponent"),
  ("Penalty Kicks Save%", "penalty_save_percentage"),
];

const GOALKEEPER_KEEPERS_ADV: StaticMap = &[
  ("Goals PKA", "penalty_goals_against"),
  ("Goals FK", "free_kick_goals_against"),
  ("Goals CK", "corner_kick_goals_against"),
  ("Goals OG", "own_goals_for"),
  ("Expected PSxG", "post_shot_expected_goals"),
  ("Expected PSxG/SoT", "post_shot_xg_per_shot"),
  ("Expected PSxG+/-", "post_shot_xg_performance"),
  ("Expected /90", "post_shot_xg_performance_per_90"),
  ("Launched Cmp", "goalkeeper_long_passes_completed"),
  ("Launched Att", "goalkeeper_long_passes_attempted"),
  ("Launched Cmp%", "goalkeeper_long_pass_accuracy"),
  ("Passes Att (GK)", "goalkeeper_pass_attempts"),
  ("Passes Thr", "throws"),
  ("Passes Launch%", "launch_percentage"),
  ("Passes AvgLen", "average_pass_length"),
  ("Goal Kicks Att", "goal_kicks_attempted"),
  ("Goal Kicks Launch%", "goal_kick_launch_percentage"),
  ("Goal Kicks AvgLen", "goal_kick_average_length"),
  ("Crosses Opp", "crosses_faced"),
  ("Crosses Stp", "crosses_stopped"),
  ("Crosses Stp%", "cross_stop_percentage"),
  ("Sweeper #OPA", "defensive_actions_outside_penalty_area"),
  ("Sweeper #OPA/90", "defensive_actions_outside_penalty_area_per_90"),
  ("Sweeper AvgDist", "average_distance_defensive_actions"),
];

const OUTFIELD_TABLES: &[(StatCategory, StaticMap)] = &[
  (StatCategory::Standard, OUTFIELD_STANDARD),
  (StatCategory::Shooting, OUTFIELD_SHOOTING),
  (StatCategory::Passing, OUTFIELD_PASSING),
  (StatCategory::PassingTypes, OUTFIELD_PASSING_TYPES),
  (StatCategory::GoalShotCreation, OUTFIELD_GOAL_SHOT_CREATION),
  (StatCategory::Defense, OUTFIELD_DEFENSE),
  (StatCategory::Possession, OUTFIELD_POSSESSION),
  (StatCategory::Misc, OUTFIELD_MISC),
];

const GOALKEEPER_TABLES: &[(StatCategory, StaticMap)] = &[
  (StatCategory::Standard, GOALKEEPER_STANDARD),
  (StatCategory::Keepers, GOALKEEPER_KEEPERS),
  (StatCategory::KeepersAdv, GOALKEEPER_KEEPERS_ADV),
];

/// Player-identity columns dropped when deriving team-level mappings.
const PLAYER_ONLY_COLUMNS: &[&str] = &["Player", "Nation", "Pos", "Born"];

/// Metadata and system columns never reported as unmapped.
const EXCLUDED_COLUMNS: &[&str] = &[
  "Current Date",
  "current_through_gameweek",
  "last_updated",
  "Rk",
  "Matches",
  "Player",
  "Squad",
  "Nation",
  "Pos",
  "Age",
  "Born",
];

// ─── Registry ────────────────────────────────────────────────────────────────

/// What [`MappingRegistry::classify`] found for one incoming table.
#[derive(Debug, Clone)]
pub struct Classified {
  /// Raw column → canonical column, for columns present and declared.
  pub renames: BTreeMap<String, &'static str>,
  pub issues:  MappingIssues,
}

/// Statically-declared column mappings for every `(role, category)` pair.
pub struct MappingRegistry {
  tables: HashMap<(EntityKind, StatCategory), BTreeMap<&'static str, &'static str>>,
}

impl MappingRegistry {
  pub fn new() -> Self {
    let mut tables = HashMap::new();

    for &(category, map) in OUTFIELD_TABLES {
      tables.insert(
        (EntityKind::Outfield, category),
        map.iter().copied().collect::<BTreeMap<_, _>>(),
      );
    }
    for &(category, map) in GOALKEEPER_TABLES {
      tables.insert(
        (EntityKind::Goalkeeper, category),
        map.iter().copied().collect::<BTreeMap<_, _>>(),
      );
    }

    // Squad tables aggregate the same stats at team level: drop the
    // player-identity columns, rename Squad, keep everything else.
    for &(category, map) in OUTFIELD_TABLES {
      let derived = derive_team_map(map, &BTreeSet::new());
      tables.insert((EntityKind::Squad, category), derived);
    }
    // Keeper stats also exist per squad; a destination already taken within
    // the same derived table wins by first declaration.
    for &(category, map) in GOALKEEPER_TABLES {
      if category == StatCategory::Standard {
        continue;
      }
      let taken: BTreeSet<&'static str> = tables
        .get(&(EntityKind::Squad, category))
        .map(|m| m.values().copied().collect())
        .unwrap_or_default();
      let derived = derive_team_map(map, &taken);
      tables
        .entry((EntityKind::Squad, category))
        .or_default()
        .extend(derived);
    }

    // Opponent tables mirror squad tables exactly.
    let squad_entries: Vec<_> = tables
      .iter()
      .filter(|((role, _), _)| *role == EntityKind::Squad)
      .map(|((_, category), map)| (*category, map.clone()))
      .collect();
    for (category, map) in squad_entries {
      tables.insert((EntityKind::Opponent, category), map);
    }

    Self { tables }
  }

  /// The declared raw → canonical map for a `(role, category)` pair.
  pub fn resolve(
    &self,
    role: EntityKind,
    category: StatCategory,
  ) -> Result<&BTreeMap<&'static str, &'static str>> {
    self.tables.get(&(role, category)).ok_or_else(|| {
      Error::UndeclaredTable(source_table_name(
        TableFamily::for_role(role),
        category,
      ))
    })
  }

  /// Partition an incoming table's raw columns against the declared
  /// mapping: renames to apply, unmapped statistical columns (a data
  /// quality signal, not an error), and declared columns the source no
  /// longer delivers.
  pub fn classify(
    &self,
    role: EntityKind,
    category: StatCategory,
    columns: &BTreeSet<String>,
  ) -> Result<Classified> {
    let declared = self.resolve(role, category)?;
    let table = source_table_name(TableFamily::for_role(role), category);

    let mut renames = BTreeMap::new();
    let mut missing = Vec::new();
    for (&raw, &canonical) in declared {
      if columns.contains(raw) {
        renames.insert(raw.to_string(), canonical);
      } else {
        missing.push(raw.to_string());
      }
    }

    let unmapped: Vec<String> = columns
      .iter()
      .filter(|col| {
        !declared.contains_key(col.as_str())
          && !EXCLUDED_COLUMNS.contains(&col.as_str())
      })
      .cloned()
      .collect();

    Ok(Classified {
      renames,
      issues: MappingIssues { table, unmapped, missing },
    })
  }
}

impl Default for MappingRegistry {
  fn default() -> Self { Self::new() }
}

#[cfg(test)]
impl MappingRegistry {
  /// Build a registry from explicit tables — for exercising failure paths
  /// the production declarations are designed never to hit.
  pub(crate) fn from_tables(
    tables: HashMap<(EntityKind, StatCategory), BTreeMap<&'static str, &'static str>>,
  ) -> Self {
    Self { tables }
  }
}

fn derive_team_map(
  map: StaticMap,
  taken: &BTreeSet<&'static str>,
) -> BTreeMap<&'static str, &'static str> {
  let mut derived = BTreeMap::new();
  let mut used = taken.clone();
  for &(raw, canonical) in map {
    if PLAYER_ONLY_COLUMNS.contains(&raw) {
      continue;
    }
    let canonical = if raw == "Squad" { "squad_name" } else { canonical };
    if used.insert(canonical) {
      derived.insert(raw, canonical);
    }
  }
  derived
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator;

  use super::*;

  fn columns(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn every_declared_table_has_unique_destinations() {
    let registry = MappingRegistry::new();
    for role in EntityKind::iter() {
      for &category in role_categories(role) {
        let map = registry.resolve(role, category).unwrap();
        let destinations: BTreeSet<_> = map.values().collect();
        assert_eq!(
          destinations.len(),
          map.len(),
          "duplicate destination in {role:?}/{category:?}"
        );
      }
    }
  }

  #[test]
  fn squad_map_drops_player_columns_and_renames_squad() {
    let registry = MappingRegistry::new();
    let map = registry
      .resolve(EntityKind::Squad, StatCategory::Standard)
      .unwrap();
    assert_eq!(map.get("Squad"), Some(&"squad_name"));
    assert!(!map.contains_key("Player"));
    assert!(!map.contains_key("Born"));
    assert_eq!(map.get("Performance Gls"), Some(&"goals"));
  }

  #[test]
  fn opponent_maps_mirror_squad_maps() {
    let registry = MappingRegistry::new();
    for &category in role_categories(EntityKind::Squad) {
      let squad = registry.resolve(EntityKind::Squad, category).unwrap();
      let opponent = registry.resolve(EntityKind::Opponent, category).unwrap();
      assert_eq!(squad, opponent, "{category:?}");
    }
  }

  #[test]
  fn goalkeepers_have_no_outfield_auxiliary_tables() {
    let registry = MappingRegistry::new();
    assert!(registry
      .resolve(EntityKind::Goalkeeper, StatCategory::Shooting)
      .is_err());
    assert!(registry
      .resolve(EntityKind::Outfield, StatCategory::Keepers)
      .is_err());
  }

  #[test]
  fn classify_partitions_columns() {
    let registry = MappingRegistry::new();
    let classified = registry
      .classify(
        EntityKind::Outfield,
        StatCategory::Shooting,
        &columns(&[
          "Player",         // excluded metadata: silent
          "Rk",             // excluded metadata: silent
          "Standard Sh",    // declared and present
          "Standard SoT",   // declared and present
          "Standard NewXg", // unmapped statistical column
        ]),
      )
      .unwrap();

    assert_eq!(classified.renames.get("Standard Sh"), Some(&"shots"));
    assert_eq!(classified.issues.unmapped, vec!["Standard NewXg"]);
    // Everything declared but absent upstream shows as missing.
    assert!(classified
      .issues
      .missing
      .contains(&"Standard Dist".to_string()));
    assert!(!classified.issues.missing.contains(&"Standard Sh".to_string()));
  }

  #[test]
  fn classify_clean_table_reports_nothing() {
    let registry = MappingRegistry::new();
    let all: BTreeSet<String> = registry
      .resolve(EntityKind::Goalkeeper, StatCategory::Keepers)
      .unwrap()
      .keys()
      .map(|s| s.to_string())
      .collect();
    let classified = registry
      .classify(EntityKind::Goalkeeper, StatCategory::Keepers, &all)
      .unwrap();
    assert!(classified.issues.is_clean());
  }
}
