use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::endpoints::{self, EndpointDef};
use crate::error::ConfigError;
use crate::record::{EntityKind, StatValues};
use crate::subtract::ResolvedFilter;

pub const TS_FTA_WEIGHT: f64 = 0.44;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scaling {
    Games,
    Minutes,
    Possessions,
    #[default]
    Count,
    Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueTransform {
    Int {
        #[serde(default = "unit_scale")]
        scale: f64,
    },
    Float {
        #[serde(default = "unit_scale")]
        scale: f64,
    },
    Percentage,
    Ratio { denominator: String },
}

fn unit_scale() -> f64 {
    1.0
}

impl Default for ValueTransform {
    fn default() -> Self {
        ValueTransform::Float { scale: 1.0 }
    }
}

impl ValueTransform {
    pub fn apply(&self, raw: f64, denominator: Option<f64>) -> Option<f64> {
        match self {
            ValueTransform::Int { scale } => Some((raw * scale).trunc()),
            ValueTransform::Float { scale } => Some(raw * scale),
            ValueTransform::Percentage => Some(raw * 100.0),
            ValueTransform::Ratio { .. } => {
                let den = denominator?;
                if den == 0.0 { None } else { Some(raw / den) }
            }
        }
    }

    pub fn denominator_field(&self) -> Option<&str> {
        match self {
            ValueTransform::Ratio { denominator } => Some(denominator.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryFilter {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDef {
    pub field: String,
    pub buckets: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub endpoint: String,
    pub result_set: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Nested subset of `result_set` to subtract after filtering.
    #[serde(default)]
    pub subtract: Option<String>,
    #[serde(default)]
    pub filter: Option<CategoryFilter>,
    pub field: String,
    #[serde(default)]
    pub minus_field: Option<String>,
    #[serde(default)]
    pub transform: ValueTransform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum TierSource {
    Player(SourceSpec),
    Team(SourceSpec),
    TeamRollup,
}

impl TierSource {
    pub fn kind(&self) -> EntityKind {
        match self {
            TierSource::Player(_) => EntityKind::Player,
            TierSource::Team(_) | TierSource::TeamRollup => EntityKind::Team,
        }
    }

    pub fn spec(&self) -> Option<&SourceSpec> {
        match self {
            TierSource::Player(spec) | TierSource::Team(spec) => Some(spec),
            TierSource::TeamRollup => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default)]
    pub scaling: Scaling,
    #[serde(default)]
    pub lower_is_better: bool,
    pub sources: Vec<TierSource>,
}

impl ColumnSpec {
    pub fn source_for(&self, kind: EntityKind) -> Option<&TierSource> {
        self.sources.iter().find(|s| s.kind() == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DerivedFormula {
    Points,
    TrueShooting,
    Percentage { makes: String, attempts: String },
}

impl DerivedFormula {
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            DerivedFormula::Points => vec!["fg2m", "fg3m", "ftm"],
            DerivedFormula::TrueShooting => vec!["fg2m", "fg3m", "ftm", "fg2a", "fg3a", "fta"],
            DerivedFormula::Percentage { makes, attempts } => {
                vec![makes.as_str(), attempts.as_str()]
            }
        }
    }

    pub fn evaluate(&self, values: &StatValues) -> Option<f64> {
        let get = |name: &str| values.get(name).copied().flatten();
        match self {
            DerivedFormula::Points => Some(points(get("fg2m")?, get("fg3m")?, get("ftm")?)),
            DerivedFormula::TrueShooting => {
                let pts = points(get("fg2m")?, get("fg3m")?, get("ftm")?);
                let fga = get("fg2a")? + get("fg3a")?;
                let den = 2.0 * (fga + TS_FTA_WEIGHT * get("fta")?);
                if den <= 0.0 { None } else { Some(pts / den * 100.0) }
            }
            DerivedFormula::Percentage { makes, attempts } => {
                let att = get(attempts.as_str())?;
                if att <= 0.0 {
                    None
                } else {
                    Some(get(makes.as_str())? / att * 100.0)
                }
            }
        }
    }

    pub fn scaling(&self) -> Scaling {
        match self {
            DerivedFormula::Points => Scaling::Count,
            _ => Scaling::Rate,
        }
    }
}

fn points(fg2m: f64, fg3m: f64, ftm: f64) -> f64 {
    2.0 * fg2m + 3.0 * fg3m + ftm
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedSpec {
    pub name: String,
    #[serde(default)]
    pub lower_is_better: bool,
    pub formula: DerivedFormula,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ColumnDocument {
    #[serde(default)]
    categories: BTreeMap<String, CategoryDef>,
    columns: Vec<ColumnSpec>,
    #[serde(default)]
    derived: Vec<DerivedSpec>,
}

#[derive(Debug, Clone)]
pub struct ColumnSet {
    categories: BTreeMap<String, CategoryDef>,
    columns: Vec<ColumnSpec>,
    derived: Vec<DerivedSpec>,
    games: String,
    minutes: String,
    possessions: Option<String>,
}

impl ColumnSet {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read column spec {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("load column spec {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let doc: ColumnDocument = serde_json::from_str(raw).context("parse column spec json")?;
        Ok(Self::validate(doc.categories, doc.columns, doc.derived)?)
    }

    pub fn validate(
        categories: BTreeMap<String, CategoryDef>,
        columns: Vec<ColumnSpec>,
        derived: Vec<DerivedSpec>,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(ConfigError::DuplicateColumn(col.name.clone()));
            }
            validate_column(col, &categories)?;
        }

        let games = single_baseline(&columns, Scaling::Games, "games")?
            .ok_or(ConfigError::MissingBaseline("games"))?;
        let minutes = single_baseline(&columns, Scaling::Minutes, "minutes")?
            .ok_or(ConfigError::MissingBaseline("minutes"))?;
        let possessions = single_baseline(&columns, Scaling::Possessions, "possessions")?;

        for d in &derived {
            if !seen.insert(d.name.as_str()) {
                return Err(ConfigError::DuplicateColumn(d.name.clone()));
            }
            for input in d.formula.inputs() {
                let counting = columns
                    .iter()
                    .any(|c| c.name == input && c.scaling == Scaling::Count);
                if !counting {
                    return Err(ConfigError::UnknownDerivedInput {
                        stat: d.name.clone(),
                        input: input.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            categories,
            columns,
            derived,
            games,
            minutes,
            possessions,
        })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn derived(&self) -> &[DerivedSpec] {
        &self.derived
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn games_column(&self) -> &str {
        &self.games
    }

    pub fn minutes_column(&self) -> &str {
        &self.minutes
    }

    pub fn possessions_column(&self) -> Option<&str> {
        self.possessions.as_deref()
    }

    pub fn stat_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.derived.iter().map(|d| d.name.as_str()))
            .collect()
    }

    pub fn lower_is_better(&self, stat: &str) -> bool {
        if let Some(col) = self.column(stat) {
            return col.lower_is_better;
        }
        self.derived
            .iter()
            .any(|d| d.name == stat && d.lower_is_better)
    }

    pub fn resolve_filter(&self, filter: &CategoryFilter) -> Option<ResolvedFilter> {
        let def = self.categories.get(&filter.key)?;
        let values = def.buckets.get(&filter.value)?;
        Some(ResolvedFilter {
            field: def.field.clone(),
            values: values.clone(),
        })
    }

    pub fn endpoints_for_tier(&self, kind: EntityKind) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = Vec::new();
        for col in &self.columns {
            let Some(spec) = col.source_for(kind).and_then(TierSource::spec) else {
                continue;
            };
            if let Some(def) = endpoints::lookup(&spec.endpoint)
                && !out.contains(&def.id)
            {
                out.push(def.id);
            }
        }
        out
    }

    pub fn rollup_columns(&self) -> Vec<&ColumnSpec> {
        self.columns
            .iter()
            .filter(|c| matches!(c.source_for(EntityKind::Team), Some(TierSource::TeamRollup)))
            .collect()
    }

    pub fn apply_derived(&self, values: &mut StatValues) {
        for d in &self.derived {
            let v = d.formula.evaluate(values);
            values.insert(d.name.clone(), v);
        }
    }
}

fn single_baseline(
    columns: &[ColumnSpec],
    scaling: Scaling,
    label: &'static str,
) -> Result<Option<String>, ConfigError> {
    let mut found = columns.iter().filter(|c| c.scaling == scaling);
    let first = found.next().map(|c| c.name.clone());
    if found.next().is_some() {
        return Err(ConfigError::DuplicateBaseline(label));
    }
    Ok(first)
}

fn validate_column(
    col: &ColumnSpec,
    categories: &BTreeMap<String, CategoryDef>,
) -> Result<(), ConfigError> {
    if col.sources.is_empty() {
        return Err(ConfigError::NoSources {
            column: col.name.clone(),
        });
    }
    let mut tiers = HashSet::new();
    for source in &col.sources {
        let kind = source.kind();
        if !tiers.insert(kind) {
            return Err(ConfigError::DuplicateTier {
                column: col.name.clone(),
                tier: kind.to_string(),
            });
        }
        match source {
            TierSource::Player(spec) | TierSource::Team(spec) => {
                validate_source(&col.name, kind, spec, categories)?;
            }
            TierSource::TeamRollup => {
                if col.source_for(EntityKind::Player).is_none() {
                    return Err(ConfigError::RollupWithoutPlayerSource {
                        column: col.name.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn validate_source(
    column: &str,
    kind: EntityKind,
    spec: &SourceSpec,
    categories: &BTreeMap<String, CategoryDef>,
) -> Result<(), ConfigError> {
    let def: &EndpointDef =
        endpoints::lookup(&spec.endpoint).ok_or_else(|| ConfigError::UnknownEndpoint {
            column: column.to_string(),
            endpoint: spec.endpoint.clone(),
        })?;
    if !def.serves(kind) {
        return Err(ConfigError::TierMismatch {
            column: column.to_string(),
            endpoint: def.id.to_string(),
            tier: kind.to_string(),
        });
    }
    let unknown_set = |name: &str| ConfigError::UnknownResultSet {
        column: column.to_string(),
        endpoint: def.id.to_string(),
        result_set: name.to_string(),
    };
    if !def.has_result_set(&spec.result_set) {
        return Err(unknown_set(&spec.result_set));
    }
    if let Some(subset) = &spec.subtract {
        if !def.has_result_set(subset) {
            return Err(unknown_set(subset));
        }
        if !def.is_nested(subset, &spec.result_set) {
            return Err(ConfigError::NotASuperset {
                column: column.to_string(),
                superset: spec.result_set.clone(),
                subset: subset.clone(),
            });
        }
    }
    for param in spec.params.keys() {
        if endpoints::is_season_param(param) || param == def.season_type_param {
            return Err(ConfigError::SeasonTypeLiteral {
                column: column.to_string(),
                param: param.clone(),
            });
        }
        if !def.accepts_param(param) {
            return Err(ConfigError::UnknownParam {
                column: column.to_string(),
                endpoint: def.id.to_string(),
                param: param.clone(),
            });
        }
    }
    if let Some(filter) = &spec.filter {
        let known = categories
            .get(&filter.key)
            .is_some_and(|cat| cat.buckets.contains_key(&filter.value));
        if !known {
            return Err(ConfigError::UnknownCategory {
                column: column.to_string(),
                key: filter.key.clone(),
                value: filter.value.clone(),
            });
        }
    }
    let blank = |s: &str| s.trim().is_empty();
    if blank(&spec.field)
        || spec.minus_field.as_deref().is_some_and(blank)
        || spec.transform.denominator_field().is_some_and(blank)
    {
        return Err(ConfigError::EmptyField {
            column: column.to_string(),
        });
    }
    Ok(())
}
