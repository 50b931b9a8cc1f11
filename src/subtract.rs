use serde::{Deserialize, Serialize};

use crate::fetch::Row;
use crate::record::EntityId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedFilter {
    pub field: String,
    pub values: Vec<String>,
}

impl ResolvedFilter {
    pub fn matches(&self, row: &Row) -> bool {
        row.text(&self.field)
            .is_some_and(|v| self.values.iter().any(|want| want.trim() == v.trim()))
    }
}

/// A subtraction that came out negative. The inputs contradict the declared
/// nesting, so the value is dropped and the defect reported.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtractionViolation {
    pub entity_id: EntityId,
    pub column: String,
    pub superset: String,
    pub subset: String,
    pub superset_value: f64,
    pub subset_value: f64,
}

pub fn filtered_total<F>(rows: &[Row], filter: Option<&ResolvedFilter>, value: F) -> f64
where
    F: Fn(&Row) -> Option<f64>,
{
    rows.iter()
        .filter(|row| filter.is_none_or(|f| f.matches(row)))
        .filter_map(value)
        .sum()
}

pub struct NestedInputs<'a> {
    pub superset: &'a str,
    pub superset_rows: &'a [Row],
    pub subset: &'a str,
    pub subset_rows: &'a [Row],
}

/// `filtered(superset) - filtered(subset)`. The filter is applied to each
/// side before subtracting; an entity missing from the subset contributes 0.
pub fn subtract_nested<F>(
    column: &str,
    entity_id: EntityId,
    inputs: &NestedInputs<'_>,
    filter: Option<&ResolvedFilter>,
    value: F,
) -> Result<f64, SubtractionViolation>
where
    F: Fn(&Row) -> Option<f64>,
{
    let all = filtered_total(inputs.superset_rows, filter, &value);
    let nested = filtered_total(inputs.subset_rows, filter, &value);
    let diff = all - nested;
    if diff < -1e-9 {
        return Err(SubtractionViolation {
            entity_id,
            column: column.to_string(),
            superset: inputs.superset.to_string(),
            subset: inputs.subset.to_string(),
            superset_value: all,
            subset_value: nested,
        });
    }
    Ok(diff.max(0.0))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(range: &str, fg3m: f64) -> Row {
        Row::from_pairs([
            ("CLOSE_DEF_DIST_RANGE", json!(range)),
            ("FG3M", json!(fg3m)),
        ])
    }

    fn open() -> ResolvedFilter {
        ResolvedFilter {
            field: "CLOSE_DEF_DIST_RANGE".into(),
            values: vec!["4-6 Feet - Open".into(), "6+ Feet - Wide Open".into()],
        }
    }

    #[test]
    fn filters_both_sides_before_subtracting() {
        let superset = vec![
            row("0-2 Feet - Very Tight", 40.0),
            row("4-6 Feet - Open", 100.0),
            row("6+ Feet - Wide Open", 50.0),
        ];
        let subset = vec![row("0-2 Feet - Very Tight", 30.0), row("4-6 Feet - Open", 60.0)];
        let inputs = NestedInputs {
            superset: "all",
            superset_rows: &superset,
            subset: "far",
            subset_rows: &subset,
        };
        let filter = open();
        let v = subtract_nested("open_fg3m", 1, &inputs, Some(&filter), |r| r.number("FG3M"));
        assert_eq!(v, Ok(90.0));
    }

    #[test]
    fn negative_difference_is_reported_not_clamped() {
        let superset = vec![row("4-6 Feet - Open", 10.0)];
        let subset = vec![row("4-6 Feet - Open", 12.0)];
        let inputs = NestedInputs {
            superset: "all",
            superset_rows: &superset,
            subset: "far",
            subset_rows: &subset,
        };
        let err = subtract_nested("x", 9, &inputs, None, |r| r.number("FG3M")).unwrap_err();
        assert_eq!(err.entity_id, 9);
        assert_eq!(err.superset_value, 10.0);
        assert_eq!(err.subset_value, 12.0);
    }
}
