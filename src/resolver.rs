use std::collections::BTreeMap;

use crate::column_spec::{ColumnSet, Scaling, SourceSpec, TierSource};
use crate::endpoints::{self, EndpointDef, Fanout};
use crate::record::EntityKind;
use crate::season::{Season, SeasonType};
use crate::subtract::ResolvedFilter;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub endpoint: &'static str,
    pub fanout: Fanout,
    pub kind: EntityKind,
    pub params: BTreeMap<String, String>,
}

impl FetchRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPlan {
    pub column: String,
    pub scaling: Scaling,
    pub request: usize,
    pub source: SourceSpec,
    pub filter: Option<ResolvedFilter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub kind: EntityKind,
    pub season: Season,
    pub season_type: SeasonType,
    pub requests: Vec<FetchRequest>,
    pub columns: Vec<ColumnPlan>,
    pub rollups: Vec<String>,
    pub unavailable: Vec<String>,
}

pub fn resolve(
    spec: &ColumnSet,
    kind: EntityKind,
    season: Season,
    season_type: SeasonType,
) -> ExecutionPlan {
    build_plan(spec, kind, season, season_type, |_| true)
}

pub fn resolve_for_endpoint(
    spec: &ColumnSet,
    kind: EntityKind,
    endpoint: &str,
    season: Season,
    season_type: SeasonType,
) -> ExecutionPlan {
    let mut plan = build_plan(spec, kind, season, season_type, |id| id == endpoint);
    if endpoint != endpoints::PLAYER_ROLLUP {
        plan.rollups.clear();
    }
    plan
}

fn build_plan(
    spec: &ColumnSet,
    kind: EntityKind,
    season: Season,
    season_type: SeasonType,
    wanted: impl Fn(&str) -> bool,
) -> ExecutionPlan {
    let mut plan = ExecutionPlan {
        kind,
        season,
        season_type,
        requests: Vec::new(),
        columns: Vec::new(),
        rollups: Vec::new(),
        unavailable: Vec::new(),
    };

    for col in spec.columns() {
        let source = match col.source_for(kind) {
            Some(TierSource::TeamRollup) => {
                if wanted(endpoints::PLAYER_ROLLUP) {
                    plan.rollups.push(col.name.clone());
                }
                continue;
            }
            Some(source) => source,
            None => continue,
        };
        let Some(source_spec) = source.spec() else {
            continue;
        };
        let Some(def) = endpoints::lookup(&source_spec.endpoint) else {
            continue;
        };
        if !wanted(def.id) {
            continue;
        }
        if !def.available_for(season, season_type) {
            plan.unavailable.push(col.name.clone());
            continue;
        }

        let request = FetchRequest {
            endpoint: def.id,
            fanout: def.fanout,
            kind,
            params: request_params(def, source_spec, kind, season, season_type),
        };
        let index = match plan.requests.iter().position(|r| *r == request) {
            Some(index) => index,
            None => {
                plan.requests.push(request);
                plan.requests.len() - 1
            }
        };
        let filter = source_spec
            .filter
            .as_ref()
            .and_then(|f| spec.resolve_filter(f));
        plan.columns.push(ColumnPlan {
            column: col.name.clone(),
            scaling: col.scaling,
            request: index,
            source: source_spec.clone(),
            filter,
        });
    }
    plan
}

/// Catalog defaults, then column overrides, then the pass's season and
/// season type. The last two always come from the caller.
pub fn request_params(
    def: &EndpointDef,
    source: &SourceSpec,
    kind: EntityKind,
    season: Season,
    season_type: SeasonType,
) -> BTreeMap<String, String> {
    let mut params: BTreeMap<String, String> = def
        .defaults
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for (k, v) in &source.params {
        if endpoints::is_season_param(k) || k == def.season_type_param {
            continue;
        }
        params.insert(k.clone(), v.clone());
    }
    params.insert("Season".to_string(), season.label());
    params.insert(
        def.season_type_param.to_string(),
        season_type.api_name().to_string(),
    );
    if let Some(entity_param) = def.entity_param {
        params.insert(entity_param.to_string(), kind.api_name().to_string());
    }
    params
}

pub fn roster_request(kind: EntityKind, season: Season, season_type: SeasonType) -> FetchRequest {
    let def = endpoints::roster_endpoint(kind);
    let base = SourceSpec {
        endpoint: def.id.to_string(),
        result_set: def.result_sets[0].to_string(),
        params: BTreeMap::new(),
        subtract: None,
        filter: None,
        field: String::new(),
        minus_field: None,
        transform: Default::default(),
    };
    FetchRequest {
        endpoint: def.id,
        fanout: def.fanout,
        kind,
        params: request_params(def, &base, kind, season, season_type),
    }
}
