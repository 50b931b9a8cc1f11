use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::warn;

use crate::column_spec::SourceSpec;
use crate::fetch::{FetchedEndpoint, Row};
use crate::record::{EntityId, StatValues};
use crate::resolver::ExecutionPlan;
use crate::subtract::{NestedInputs, ResolvedFilter, SubtractionViolation, subtract_nested};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractOutcome {
    pub values: BTreeMap<EntityId, StatValues>,
    pub violations: Vec<SubtractionViolation>,
}

pub fn row_value(source: &SourceSpec, row: &Row) -> Option<f64> {
    let mut raw = row.number(&source.field)?;
    if let Some(minus) = &source.minus_field {
        raw -= row.number(minus)?;
    }
    let denominator = source
        .transform
        .denominator_field()
        .and_then(|field| row.number(field));
    source.transform.apply(raw, denominator)
}

pub fn extract(
    plan: &ExecutionPlan,
    fetched: &[Rc<FetchedEndpoint>],
    entities: &[EntityId],
) -> ExtractOutcome {
    let mut ids: BTreeSet<EntityId> = entities.iter().copied().collect();
    for f in fetched {
        ids.extend(f.covered.iter().copied());
    }

    let mut out = ExtractOutcome::default();
    let empty: &[Row] = &[];

    for col in &plan.columns {
        let Some(data) = fetched.get(col.request) else {
            continue;
        };
        let source = &col.source;
        let superset = data.set(&source.result_set);
        if superset.is_none() && !data.covered.is_empty() {
            warn!(
                column = %col.column,
                result_set = %source.result_set,
                "result set missing from response"
            );
        }
        let subset = source.subtract.as_deref().map(|name| (name, data.set(name)));
        let filter = col.filter.as_ref();

        for id in &ids {
            let value = if !data.is_measured(*id) {
                None
            } else {
                let rows = superset.map_or(empty, |s| s.rows_for(*id));
                match subset {
                    Some((subset_name, subset_set)) => {
                        let inputs = NestedInputs {
                            superset: &source.result_set,
                            superset_rows: rows,
                            subset: subset_name,
                            subset_rows: subset_set.map_or(empty, |s| s.rows_for(*id)),
                        };
                        match subtract_nested(&col.column, *id, &inputs, filter, |r| {
                            row_value(source, r)
                        }) {
                            Ok(v) => Some(v),
                            Err(violation) => {
                                warn!(
                                    entity_id = id,
                                    column = %col.column,
                                    superset = violation.superset_value,
                                    subset = violation.subset_value,
                                    "nested subset exceeds superset"
                                );
                                out.violations.push(violation);
                                None
                            }
                        }
                    }
                    None => plain_total(source, rows, col.filter.as_ref()),
                }
            };
            out.values
                .entry(*id)
                .or_default()
                .insert(col.column.clone(), value);
        }
    }
    out
}

/// No matching rows means measured as zero. Matching rows that all lack the
/// field mean the value was not measured.
fn plain_total(
    source: &SourceSpec,
    rows: &[Row],
    filter: Option<&ResolvedFilter>,
) -> Option<f64> {
    let mut matched = false;
    let mut total = None::<f64>;
    for row in rows.iter().filter(|r| filter.is_none_or(|f| f.matches(r))) {
        matched = true;
        if let Some(v) = row_value(source, row) {
            total = Some(total.unwrap_or(0.0) + v);
        }
    }
    if matched { total } else { Some(0.0) }
}
