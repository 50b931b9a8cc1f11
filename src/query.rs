use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;

use crate::column_spec::ColumnSet;
use crate::percentile::{Rgb, gradient_color, rank_population};
use crate::record::{EntityId, EntityKind};
use crate::scaler::{StatModeResult, aggregate_span, scale};
use crate::season::Season;
use crate::settings::ViewSettings;
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct QueryRow {
    pub entity_id: EntityId,
    pub name: String,
    pub result: StatModeResult,
    pub percentiles: BTreeMap<String, Option<f64>>,
}

impl QueryRow {
    pub fn percentile(&self, stat: &str) -> Option<f64> {
        self.percentiles.get(stat).copied().flatten()
    }

    pub fn color(&self, stat: &str) -> Option<Rgb> {
        self.percentile(stat).map(gradient_color)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatTable {
    pub kind: EntityKind,
    pub settings: ViewSettings,
    pub stats: Vec<String>,
    pub rows: Vec<QueryRow>,
}

impl StatTable {
    pub fn row(&self, entity_id: EntityId) -> Option<&QueryRow> {
        self.rows.iter().find(|r| r.entity_id == entity_id)
    }
}

pub fn query_population(
    store: &Store,
    spec: &ColumnSet,
    settings: &ViewSettings,
    kind: EntityKind,
    current: Season,
) -> Result<StatTable> {
    let seasons = settings.season_scope.seasons(current);
    let records = store.load_records(kind, seasons.as_deref(), &settings.season_types)?;
    let results = aggregate_span(spec, &records)
        .iter()
        .map(|totals| scale(spec, totals, settings.mode, settings.absent_policy))
        .collect::<Vec<_>>();
    let ranks = rank_population(spec, &results);
    let names = store.entity_names(kind)?;

    let rows = results
        .into_iter()
        .map(|result| {
            let percentiles = ranks.percentiles_for(&result);
            let name = names
                .get(&result.entity_id)
                .cloned()
                .unwrap_or_else(|| format!("#{}", result.entity_id));
            QueryRow {
                entity_id: result.entity_id,
                name,
                result,
                percentiles,
            }
        })
        .collect();

    Ok(StatTable {
        kind,
        settings: settings.clone(),
        stats: spec.stat_names().into_iter().map(str::to_string).collect(),
        rows,
    })
}
