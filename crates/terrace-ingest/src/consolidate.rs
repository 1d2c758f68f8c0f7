//! The entity consolidator.
//!
//! Merges one base source table and its auxiliary tables into one wide
//! record per entity, per role. Joining happens on a derived entity key;
//! every column travels through the mapping registry first, so a join that
//! would land two sources in one destination column is detected and fails
//! the run before anything is written.
//!
//! Output records carry business identity but no version metadata — that is
//! added later by the SCD writer, which keeps this layer pure and testable
//! independent of versioning policy.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;
use terrace_core::{
  entity::{self, EntityKind},
  record::{FieldMap, WideRecord},
  report::MappingIssues,
  source::{SourceRow, SourceTable},
};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  mappings::{
    MappingRegistry, StatCategory, TableFamily, role_categories,
    source_table_name,
  },
};

// ─── Output ──────────────────────────────────────────────────────────────────

/// Everything one consolidation pass produced, across all four roles.
#[derive(Debug, Default)]
pub struct Consolidated {
  pub records:            BTreeMap<EntityKind, Vec<WideRecord>>,
  pub issues:             Vec<MappingIssues>,
  /// Source table name → duplicate rows dropped (first occurrence wins).
  pub duplicates_dropped: BTreeMap<String, u64>,
}

// ─── Consolidator ────────────────────────────────────────────────────────────

pub struct Consolidator {
  registry: MappingRegistry,
}

impl Consolidator {
  pub fn new() -> Self {
    Self { registry: MappingRegistry::new() }
  }

  /// Use a custom registry. The default registry is the declared production
  /// mapping set.
  pub fn with_registry(registry: MappingRegistry) -> Self {
    Self { registry }
  }

  /// The three base tables a consolidation pass cannot run without.
  pub fn base_tables() -> Vec<String> {
    [TableFamily::Player, TableFamily::Squad, TableFamily::Opponent]
      .into_iter()
      .map(|family| source_table_name(family, StatCategory::Standard))
      .collect()
  }

  /// Every source table a full consolidation pass reads.
  pub fn required_tables() -> Vec<String> {
    use StatCategory::*;
    let all = [
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
    ];
    let mut names = Vec::new();
    for family in [TableFamily::Player, TableFamily::Squad, TableFamily::Opponent]
    {
      for category in all {
        names.push(source_table_name(family, category));
      }
    }
    names
  }

  /// Consolidate all four entity roles from one set of source tables.
  ///
  /// `season` feeds business identity; it is not a statistic.
  pub fn consolidate_all(
    &self,
    tables: &BTreeMap<String, SourceTable>,
    season: &str,
  ) -> Result<Consolidated> {
    let mut out = Consolidated::default();

    // Players: the two roles share one base table but draw from disjoint
    // auxiliary sets, so the split happens before either join chain runs.
    let base_name =
      source_table_name(TableFamily::Player, StatCategory::Standard);
    let base = tables
      .get(&base_name)
      .ok_or_else(|| Error::MissingBaseTable(base_name.clone()))?;
    let base_rows = dedup_rows(
      &base.rows,
      EntityKind::Outfield,
      &base_name,
      &mut out.duplicates_dropped,
    );
    let (keeper_rows, outfield_rows): (Vec<_>, Vec<_>) =
      base_rows.into_iter().partition(is_goalkeeper);
    info!(
      outfield = outfield_rows.len(),
      goalkeepers = keeper_rows.len(),
      "split player base table by role"
    );

    let outfield = self.consolidate_role(
      EntityKind::Outfield,
      outfield_rows,
      tables,
      season,
      &mut out,
    )?;
    let keepers = self.consolidate_role(
      EntityKind::Goalkeeper,
      keeper_rows,
      tables,
      season,
      &mut out,
    )?;

    let squads =
      self.consolidate_team_role(EntityKind::Squad, tables, season, &mut out)?;
    let opponents = self.consolidate_team_role(
      EntityKind::Opponent,
      tables,
      season,
      &mut out,
    )?;

    out.records.insert(EntityKind::Outfield, outfield);
    out.records.insert(EntityKind::Goalkeeper, keepers);
    out.records.insert(EntityKind::Squad, squads);
    out.records.insert(EntityKind::Opponent, opponents);
    Ok(out)
  }

  fn consolidate_team_role(
    &self,
    role: EntityKind,
    tables: &BTreeMap<String, SourceTable>,
    season: &str,
    out: &mut Consolidated,
  ) -> Result<Vec<WideRecord>> {
    let base_name =
      source_table_name(TableFamily::for_role(role), StatCategory::Standard);
    let base = tables
      .get(&base_name)
      .ok_or_else(|| Error::MissingBaseTable(base_name.clone()))?;
    let base_rows =
      dedup_rows(&base.rows, role, &base_name, &mut out.duplicates_dropped);
    self.consolidate_role(role, base_rows, tables, season, out)
  }

  /// The join chain for one role: map the base rows, then left-join each
  /// auxiliary table in declared order.
  fn consolidate_role(
    &self,
    role: EntityKind,
    base_rows: Vec<SourceRow>,
    tables: &BTreeMap<String, SourceTable>,
    season: &str,
    out: &mut Consolidated,
  ) -> Result<Vec<WideRecord>> {
    let categories = role_categories(role);
    let family = TableFamily::for_role(role);

    let classified =
      self
        .registry
        .classify(role, StatCategory::Standard, &columns_of(&base_rows))?;
    record_issues(&classified.issues, out);

    let mut keyed: Vec<(String, WideRecord)> = base_rows
      .iter()
      .map(|row| {
        (
          entity_key(role, row),
          build_base_record(role, row, &classified.renames, season),
        )
      })
      .collect();

    // Destination columns already present in the running result.
    let mut seen: BTreeSet<&'static str> =
      classified.renames.values().copied().collect();

    for &category in &categories[1..] {
      let name = source_table_name(family, category);
      let Some(table) = tables.get(&name) else {
        warn!(table = %name, "auxiliary source table absent, skipping");
        continue;
      };
      let rows =
        dedup_rows(&table.rows, role, &name, &mut out.duplicates_dropped);
      if rows.is_empty() {
        warn!(table = %name, "auxiliary source table has no rows, skipping");
        continue;
      }

      let classified = self.registry.classify(role, category, &columns_of(&rows))?;
      record_issues(&classified.issues, out);

      for &canonical in classified.renames.values() {
        if seen.contains(canonical) {
          return Err(Error::ColumnCollision {
            table:  name.clone(),
            column: canonical.to_string(),
          });
        }
      }

      let index: HashMap<String, &SourceRow> = rows
        .iter()
        .map(|row| (entity_key(role, row), row))
        .collect();

      for (key, record) in &mut keyed {
        let aux = index.get(key.as_str());
        for (raw, &canonical) in &classified.renames {
          let value = aux
            .and_then(|row| row.get(raw))
            .cloned()
            .unwrap_or(Value::Null);
          record.fields.insert(canonical.to_string(), value);
        }
      }
      seen.extend(classified.renames.values().copied());
      debug!(
        table = %name,
        columns = classified.renames.len(),
        "joined auxiliary table"
      );
    }

    if keyed.is_empty() {
      return Err(Error::EmptyConsolidation(role));
    }

    info!(
      role = role.discriminant(),
      records = keyed.len(),
      "consolidation complete"
    );
    Ok(keyed.into_iter().map(|(_, record)| record).collect())
  }
}

impl Default for Consolidator {
  fn default() -> Self { Self::new() }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

/// Deterministic join key. Players join on name + birth year + team; team
/// rows join on the raw team value, so all tables of one family agree even
/// when opponent names carry the `vs ` prefix.
fn entity_key(role: EntityKind, row: &SourceRow) -> String {
  if role.is_player() {
    format!(
      "{}_{}_{}",
      text_of(row, "Player"),
      text_of(row, "Born"),
      text_of(row, "Squad"),
    )
  } else {
    text_of(row, "Squad")
  }
}

fn build_base_record(
  role: EntityKind,
  row: &SourceRow,
  renames: &BTreeMap<String, &'static str>,
  season: &str,
) -> WideRecord {
  let mut fields = FieldMap::new();
  for (raw, &canonical) in renames {
    fields.insert(
      canonical.to_string(),
      row.get(raw).cloned().unwrap_or(Value::Null),
    );
  }

  let (entity_id, team) = match role {
    EntityKind::Outfield | EntityKind::Goalkeeper => {
      let name = text_of(row, "Player");
      let team = text_of(row, "Squad");
      let born = born_year(row.get("Born"));
      (entity::player_identity(&name, born, &team, season), team)
    }
    EntityKind::Squad => {
      let team = text_of(row, "Squad");
      (entity::team_identity(&team, season), team)
    }
    EntityKind::Opponent => {
      // Opponent rows name the allowing team as "vs Arsenal"; strip the
      // prefix so routing and identity use the team's own name.
      let team = strip_vs(&text_of(row, "Squad"));
      fields.insert("squad_name".to_string(), Value::String(team.clone()));
      (entity::team_identity(&team, season), team)
    }
  };

  WideRecord { entity_id, team, season: season.to_string(), fields }
}

fn dedup_rows(
  rows: &[SourceRow],
  role: EntityKind,
  table: &str,
  dropped: &mut BTreeMap<String, u64>,
) -> Vec<SourceRow> {
  let mut seen = BTreeSet::new();
  let mut kept = Vec::with_capacity(rows.len());
  for row in rows {
    if seen.insert(entity_key(role, row)) {
      kept.push(row.clone());
    }
  }
  let removed = (rows.len() - kept.len()) as u64;
  if removed > 0 {
    warn!(table = %table, removed, "dropped duplicate rows, first occurrence wins");
    *dropped.entry(table.to_string()).or_insert(0) += removed;
  }
  kept
}

fn record_issues(issues: &MappingIssues, out: &mut Consolidated) {
  if !issues.missing.is_empty() {
    warn!(
      table = %issues.table,
      columns = ?issues.missing,
      "declared columns missing from source table"
    );
  }
  if !issues.unmapped.is_empty() {
    info!(
      table = %issues.table,
      columns = ?issues.unmapped,
      "unmapped statistical columns in source table"
    );
  }
  if !issues.is_clean() {
    out.issues.push(issues.clone());
  }
}

fn columns_of(rows: &[SourceRow]) -> BTreeSet<String> {
  rows.iter().flat_map(|row| row.keys().cloned()).collect()
}

fn is_goalkeeper(row: &SourceRow) -> bool {
  text_of(row, "Pos").contains("GK")
}

fn strip_vs(name: &str) -> String {
  name.strip_prefix("vs ").unwrap_or(name).trim().to_string()
}

/// Render a raw value the way the join key needs it: strings trimmed,
/// integral floats without the trailing `.0`, nulls empty.
fn text_of(row: &SourceRow, column: &str) -> String {
  match row.get(column) {
    Some(Value::String(s)) => s.trim().to_string(),
    Some(Value::Number(n)) => {
      if let Some(i) = n.as_i64() {
        i.to_string()
      } else if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 {
          (f as i64).to_string()
        } else {
          f.to_string()
        }
      } else {
        n.to_string()
      }
    }
    Some(Value::Bool(b)) => b.to_string(),
    _ => String::new(),
  }
}

fn born_year(value: Option<&Value>) -> Option<i64> {
  match value {
    Some(Value::Number(n)) => {
      n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))
    }
    Some(Value::String(s)) => {
      let s = s.trim();
      s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
    }
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn row(pairs: &[(&str, Value)]) -> SourceRow {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.clone()))
      .collect()
  }

  fn table(name: &str, rows: Vec<SourceRow>) -> (String, SourceTable) {
    (name.to_string(), SourceTable { name: name.to_string(), rows })
  }

  fn player_row(name: &str, pos: &str, squad: &str, goals: i64) -> SourceRow {
    row(&[
      ("Player", json!(name)),
      ("Pos", json!(pos)),
      ("Squad", json!(squad)),
      ("Born", json!(1998)),
      ("Performance Gls", json!(goals)),
    ])
  }

  fn full_tables() -> BTreeMap<String, SourceTable> {
    let mut tables = BTreeMap::new();
    let (name, t) = table(
      "player_standard",
      vec![
        player_row("Bukayo Saka", "FW,MF", "Arsenal", 12),
        player_row("David Raya", "GK", "Arsenal", 0),
      ],
    );
    tables.insert(name, t);

    let (name, t) = table(
      "player_shooting",
      vec![row(&[
        ("Player", json!("Bukayo Saka")),
        ("Born", json!(1998)),
        ("Squad", json!("Arsenal")),
        ("Standard Sh", json!(58)),
      ])],
    );
    tables.insert(name, t);

    let (name, t) = table(
      "player_keepers",
      vec![row(&[
        ("Player", json!("David Raya")),
        ("Born", json!(1998)),
        ("Squad", json!("Arsenal")),
        ("Performance Saves", json!(71)),
      ])],
    );
    tables.insert(name, t);

    let (name, t) = table(
      "squad_standard",
      vec![
        row(&[("Squad", json!("Arsenal")), ("Performance Gls", json!(61))]),
        row(&[("Squad", json!("Fulham")), ("Performance Gls", json!(44))]),
      ],
    );
    tables.insert(name, t);

    let (name, t) = table(
      "opponent_standard",
      vec![
        row(&[("Squad", json!("vs Arsenal")), ("Performance Gls", json!(24))]),
        row(&[("Squad", json!("vs Fulham")), ("Performance Gls", json!(49))]),
      ],
    );
    tables.insert(name, t);

    tables
  }

  #[test]
  fn splits_players_by_role_and_joins_per_role_tables() {
    let consolidated = Consolidator::new()
      .consolidate_all(&full_tables(), "2024-2025")
      .unwrap();

    let outfield = &consolidated.records[&EntityKind::Outfield];
    assert_eq!(outfield.len(), 1);
    assert_eq!(
      outfield[0].entity_id,
      "Bukayo Saka_1998_Arsenal_2024-2025"
    );
    assert_eq!(outfield[0].fields["shots"], json!(58));
    // Outfield records never receive goalkeeper columns.
    assert!(!outfield[0].fields.contains_key("saves"));

    let keepers = &consolidated.records[&EntityKind::Goalkeeper];
    assert_eq!(keepers.len(), 1);
    assert_eq!(keepers[0].fields["saves"], json!(71));
    assert!(!keepers[0].fields.contains_key("shots"));
  }

  #[test]
  fn left_join_fills_null_for_missing_aux_rows() {
    let mut tables = full_tables();
    // A second outfield player with no shooting row.
    tables
      .get_mut("player_standard")
      .unwrap()
      .rows
      .push(player_row("Kenny Tete", "DF", "Fulham", 1));

    let consolidated = Consolidator::new()
      .consolidate_all(&tables, "2024-2025")
      .unwrap();

    let outfield = &consolidated.records[&EntityKind::Outfield];
    let tete = outfield
      .iter()
      .find(|r| r.team == "Fulham")
      .expect("consolidated Fulham player");
    assert_eq!(tete.fields["shots"], Value::Null);
  }

  #[test]
  fn opponent_rows_strip_vs_prefix() {
    let consolidated = Consolidator::new()
      .consolidate_all(&full_tables(), "2024-2025")
      .unwrap();

    let opponents = &consolidated.records[&EntityKind::Opponent];
    let teams: Vec<_> = opponents.iter().map(|r| r.team.as_str()).collect();
    assert!(teams.contains(&"Arsenal"));
    assert!(teams.contains(&"Fulham"));
    let arsenal = opponents.iter().find(|r| r.team == "Arsenal").unwrap();
    assert_eq!(arsenal.entity_id, "Arsenal_2024-2025");
    assert_eq!(arsenal.fields["squad_name"], json!("Arsenal"));
  }

  #[test]
  fn duplicate_source_rows_keep_first_occurrence() {
    let mut tables = full_tables();
    let dup = player_row("Bukayo Saka", "FW,MF", "Arsenal", 99);
    tables.get_mut("player_standard").unwrap().rows.push(dup);

    let consolidated = Consolidator::new()
      .consolidate_all(&tables, "2024-2025")
      .unwrap();

    let outfield = &consolidated.records[&EntityKind::Outfield];
    assert_eq!(outfield.len(), 1);
    assert_eq!(outfield[0].fields["goals"], json!(12));
    assert_eq!(consolidated.duplicates_dropped["player_standard"], 1);
  }

  #[test]
  fn unmapped_columns_are_reported_not_fatal() {
    let mut tables = full_tables();
    tables
      .get_mut("player_shooting")
      .unwrap()
      .rows
      .iter_mut()
      .for_each(|r| {
        r.insert("Standard BrandNew".to_string(), json!(1));
      });

    let consolidated = Consolidator::new()
      .consolidate_all(&tables, "2024-2025")
      .unwrap();

    let issue = consolidated
      .issues
      .iter()
      .find(|i| i.table == "player_shooting")
      .expect("shooting issues recorded");
    assert!(issue.unmapped.contains(&"Standard BrandNew".to_string()));
  }

  #[test]
  fn missing_base_table_is_fatal() {
    let mut tables = full_tables();
    tables.remove("player_standard");
    let err = Consolidator::new()
      .consolidate_all(&tables, "2024-2025")
      .unwrap_err();
    assert!(matches!(err, Error::MissingBaseTable(name) if name == "player_standard"));
  }

  #[test]
  fn colliding_destinations_abort_before_any_record_is_produced() {
    use std::collections::HashMap;

    use crate::mappings::{MappingRegistry, StatCategory};

    // Two squad tables deliberately mapped to the same destination.
    let mut declared = HashMap::new();
    declared.insert(
      (EntityKind::Squad, StatCategory::Standard),
      [("Squad", "squad_name"), ("Progression PrgP", "progressive_passes")]
        .into_iter()
        .collect(),
    );
    declared.insert(
      (EntityKind::Squad, StatCategory::Shooting),
      [("PrgP", "progressive_passes")].into_iter().collect(),
    );

    let consolidator =
      Consolidator::with_registry(MappingRegistry::from_tables(declared));

    let mut tables = BTreeMap::new();
    let (name, t) = table(
      "squad_standard",
      vec![row(&[
        ("Squad", json!("Arsenal")),
        ("Progression PrgP", json!(900)),
      ])],
    );
    tables.insert(name, t);
    let (name, t) = table(
      "squad_shooting",
      vec![row(&[("Squad", json!("Arsenal")), ("PrgP", json!(901))])],
    );
    tables.insert(name, t);

    let mut out = Consolidated::default();
    let base_rows = tables["squad_standard"].rows.clone();
    let err = consolidator
      .consolidate_role(EntityKind::Squad, base_rows, &tables, "2024-2025", &mut out)
      .unwrap_err();

    assert!(matches!(
      err,
      Error::ColumnCollision { ref column, .. } if column == "progressive_passes"
    ));
  }
}
