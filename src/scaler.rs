use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::column_spec::{ColumnSet, Scaling};
use crate::record::{EntityId, EntityKind, RawStatRecord, StatValues};
use crate::settings::AbsentPolicy;

pub const DEFAULT_PER_MINUTES: f64 = 36.0;
pub const DEFAULT_PER_POSSESSIONS: f64 = 100.0;
pub const GAME_MINUTES: f64 = 48.0;
pub const POSSESSIONS_PER_GAME: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StatMode {
    Totals,
    PerGame,
    PerMinutes { minutes: f64 },
    PerPossessions { possessions: f64 },
}

impl StatMode {
    pub fn per_36() -> Self {
        StatMode::PerMinutes {
            minutes: DEFAULT_PER_MINUTES,
        }
    }

    pub fn per_100_possessions() -> Self {
        StatMode::PerPossessions {
            possessions: DEFAULT_PER_POSSESSIONS,
        }
    }

    pub fn label(&self) -> String {
        match self {
            StatMode::Totals => "totals".to_string(),
            StatMode::PerGame => "per game".to_string(),
            StatMode::PerMinutes { minutes } => format!("per {minutes} minutes"),
            StatMode::PerPossessions { possessions } => format!("per {possessions} possessions"),
        }
    }

    pub fn factor(&self, basis: &Basis) -> f64 {
        let ratio = |num: f64, den: f64| if den > 0.0 { num / den } else { 0.0 };
        match self {
            StatMode::Totals => 1.0,
            StatMode::PerGame => ratio(1.0, basis.games),
            StatMode::PerMinutes { minutes } => ratio(*minutes, basis.minutes),
            StatMode::PerPossessions { possessions } => ratio(*possessions, basis.possessions),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Basis {
    pub games: f64,
    pub minutes: f64,
    pub possessions: f64,
}

impl Basis {
    pub fn from_totals(spec: &ColumnSet, values: &StatValues) -> Self {
        let get = |name: &str| values.get(name).copied().flatten();
        let games = get(spec.games_column()).unwrap_or(0.0);
        let minutes = get(spec.minutes_column()).unwrap_or(0.0);
        let possessions = spec
            .possessions_column()
            .and_then(get)
            .unwrap_or_else(|| estimate_possessions(minutes));
        Self {
            games,
            minutes,
            possessions,
        }
    }

    fn add(self, other: Basis) -> Basis {
        Basis {
            games: self.games + other.games,
            minutes: self.minutes + other.minutes,
            possessions: self.possessions + other.possessions,
        }
    }
}

pub fn estimate_possessions(minutes: f64) -> f64 {
    minutes / GAME_MINUTES * POSSESSIONS_PER_GAME
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalsRecord {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub seasons: usize,
    pub values: StatValues,
    /// Basis of only the seasons in which a counting stat was measured, for
    /// stats missing from part of the span.
    #[serde(default)]
    pub measured_basis: BTreeMap<String, Basis>,
}

impl TotalsRecord {
    pub fn from_record(record: &RawStatRecord) -> Self {
        Self {
            kind: record.kind,
            entity_id: record.entity_id,
            seasons: 1,
            values: record.values.clone(),
            measured_basis: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatModeResult {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub mode: StatMode,
    pub seasons: usize,
    pub basis: Basis,
    pub values: StatValues,
    #[serde(default)]
    pub measured_basis: BTreeMap<String, Basis>,
}

impl StatModeResult {
    pub fn value(&self, stat: &str) -> Option<f64> {
        self.values.get(stat).copied().flatten()
    }
}

/// Sums each entity's records before any scaling. Rate columns become a
/// minutes-weighted mean. Derived stats are dropped; they are recomputed
/// after scaling.
pub fn aggregate_span(spec: &ColumnSet, records: &[RawStatRecord]) -> Vec<TotalsRecord> {
    let mut by_entity: BTreeMap<(EntityKind, EntityId), Vec<&RawStatRecord>> = BTreeMap::new();
    for r in records {
        by_entity.entry((r.kind, r.entity_id)).or_default().push(r);
    }

    let minutes_col = spec.minutes_column();
    by_entity
        .into_iter()
        .map(|((kind, entity_id), group)| {
            let seasons = group.iter().map(|r| r.season).collect::<BTreeSet<_>>().len();
            let mut values = StatValues::new();
            let mut measured_basis = BTreeMap::new();
            for col in spec.columns() {
                if col.scaling == Scaling::Count {
                    let measured = group
                        .iter()
                        .filter(|r| r.value(&col.name).is_some())
                        .collect::<Vec<_>>();
                    if !measured.is_empty() && measured.len() < group.len() {
                        let basis = measured
                            .iter()
                            .map(|r| Basis::from_totals(spec, &r.values))
                            .fold(Basis::default(), Basis::add);
                        measured_basis.insert(col.name.clone(), basis);
                    }
                }
                let present = group
                    .iter()
                    .filter_map(|r| r.value(&col.name).map(|v| (v, r.value(minutes_col))))
                    .collect::<Vec<_>>();
                let agg = if present.is_empty() {
                    None
                } else if col.scaling == Scaling::Rate {
                    Some(weighted_mean(&present))
                } else {
                    Some(present.iter().map(|(v, _)| v).sum())
                };
                values.insert(col.name.clone(), agg);
            }
            TotalsRecord {
                kind,
                entity_id,
                seasons,
                values,
                measured_basis,
            }
        })
        .collect()
}

fn weighted_mean(samples: &[(f64, Option<f64>)]) -> f64 {
    let weight: f64 = samples.iter().map(|(_, m)| m.unwrap_or(0.0).max(0.0)).sum();
    if weight > 0.0 {
        samples
            .iter()
            .map(|(v, m)| v * m.unwrap_or(0.0).max(0.0))
            .sum::<f64>()
            / weight
    } else {
        samples.iter().map(|(v, _)| v).sum::<f64>() / samples.len() as f64
    }
}

pub fn scale(
    spec: &ColumnSet,
    totals: &TotalsRecord,
    mode: StatMode,
    policy: AbsentPolicy,
) -> StatModeResult {
    let mut raw = totals.values.clone();
    if policy == AbsentPolicy::TreatAsZero {
        for col in spec.columns() {
            let slot = raw.entry(col.name.clone()).or_insert(None);
            if slot.is_none() {
                *slot = Some(0.0);
            }
        }
    }

    let basis = Basis::from_totals(spec, &raw);
    let factor = mode.factor(&basis);
    // Under TreatAsZero unmeasured seasons count as zeros over the full basis.
    let measured_basis = match policy {
        AbsentPolicy::Preserve => totals.measured_basis.clone(),
        AbsentPolicy::TreatAsZero => BTreeMap::new(),
    };
    let per_game = |v: f64| if basis.games > 0.0 { v / basis.games } else { 0.0 };

    let mut values = StatValues::new();
    for col in spec.columns() {
        let value = raw.get(&col.name).copied().flatten();
        let scaled = match col.scaling {
            Scaling::Games => value.map(f64::round),
            Scaling::Minutes => value.map(|v| match mode {
                StatMode::Totals => v,
                _ => per_game(v),
            }),
            Scaling::Possessions => Some(match mode {
                StatMode::Totals => basis.possessions,
                _ => per_game(basis.possessions),
            }),
            Scaling::Count => {
                let factor = measured_basis
                    .get(&col.name)
                    .map_or(factor, |b| mode.factor(b));
                value.map(|v| v * factor)
            }
            Scaling::Rate => value,
        };
        values.insert(col.name.clone(), scaled);
    }
    spec.apply_derived(&mut values);

    StatModeResult {
        kind: totals.kind,
        entity_id: totals.entity_id,
        mode,
        seasons: totals.seasons,
        basis,
        values,
        measured_basis,
    }
}

pub fn unscale_to_totals(spec: &ColumnSet, result: &StatModeResult) -> TotalsRecord {
    let basis = result.basis;
    let factor = result.mode.factor(&basis);
    let mut values = StatValues::new();
    for col in spec.columns() {
        let value = result.value(&col.name);
        let total = match col.scaling {
            Scaling::Games => value.map(|_| basis.games),
            Scaling::Minutes => value.map(|_| basis.minutes),
            Scaling::Possessions => Some(basis.possessions),
            Scaling::Count => {
                let factor = result
                    .measured_basis
                    .get(&col.name)
                    .map_or(factor, |b| result.mode.factor(b));
                value.map(|v| if factor > 0.0 { v / factor } else { 0.0 })
            }
            Scaling::Rate => value,
        };
        values.insert(col.name.clone(), total);
    }
    TotalsRecord {
        kind: result.kind,
        entity_id: result.entity_id,
        seasons: result.seasons,
        values,
        measured_basis: result.measured_basis.clone(),
    }
}
