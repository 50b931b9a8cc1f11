use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::column_spec::ColumnSet;
use crate::scaler::StatModeResult;

#[derive(Debug, Clone, PartialEq)]
pub struct PercentileTable {
    pub stat: String,
    pub lower_is_better: bool,
    sorted: Vec<f64>,
}

impl PercentileTable {
    pub fn build<I>(stat: &str, values: I, lower_is_better: bool) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut sorted = values
            .into_iter()
            .filter(|v| v.is_finite())
            .map(|v| if lower_is_better { -v } else { v })
            .collect::<Vec<_>>();
        sorted.sort_by(f64::total_cmp);
        Self {
            stat: stat.to_string(),
            lower_is_better,
            sorted,
        }
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Share of the other entities that are worse than or tied with `value`,
    /// 0..=100. The best value maps to 100, a unique worst value to 0 and
    /// tied values share one percentile.
    pub fn percentile(&self, value: f64) -> Option<f64> {
        if !value.is_finite() || self.sorted.is_empty() {
            return None;
        }
        let n = self.sorted.len();
        if n == 1 {
            return Some(100.0);
        }
        let goodness = if self.lower_is_better { -value } else { value };
        let worse_or_equal = self.sorted.partition_point(|v| *v <= goodness);
        let pct = worse_or_equal.saturating_sub(1) as f64 / (n - 1) as f64 * 100.0;
        Some(pct.clamp(0.0, 100.0))
    }
}

#[derive(Debug, Clone, Default)]
pub struct PopulationRanks {
    tables: HashMap<String, PercentileTable>,
}

impl PopulationRanks {
    pub fn table(&self, stat: &str) -> Option<&PercentileTable> {
        self.tables.get(stat)
    }

    pub fn percentiles_for(&self, result: &StatModeResult) -> BTreeMap<String, Option<f64>> {
        result
            .values
            .iter()
            .map(|(stat, value)| {
                let pct = if in_population(result) {
                    value.and_then(|v| self.tables.get(stat)?.percentile(v))
                } else {
                    None
                };
                (stat.clone(), pct)
            })
            .collect()
    }
}

pub fn in_population(result: &StatModeResult) -> bool {
    result.basis.minutes > 0.0
}

pub fn rank_population(spec: &ColumnSet, results: &[StatModeResult]) -> PopulationRanks {
    let population = results
        .iter()
        .filter(|r| in_population(r))
        .collect::<Vec<_>>();
    let tables = spec
        .stat_names()
        .into_par_iter()
        .map(|stat| {
            let values = population.iter().filter_map(|r| r.value(stat));
            let table = PercentileTable::build(stat, values, spec.lower_is_better(stat));
            (stat.to_string(), table)
        })
        .collect::<HashMap<_, _>>();
    PopulationRanks { tables }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub const POOR: Rgb = Rgb {
        r: 0.933,
        g: 0.294,
        b: 0.169,
    };
    pub const NEUTRAL: Rgb = Rgb {
        r: 0.988,
        g: 0.961,
        b: 0.373,
    };
    pub const ELITE: Rgb = Rgb {
        r: 0.298,
        g: 0.733,
        b: 0.090,
    };

    fn lerp(self, other: Rgb, t: f64) -> Rgb {
        Rgb {
            r: self.r * (1.0 - t) + other.r * t,
            g: self.g * (1.0 - t) + other.g * t,
            b: self.b * (1.0 - t) + other.b * t,
        }
    }

    pub fn to_hex(self) -> String {
        let channel = |c: f64| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02x}{:02x}{:02x}",
            channel(self.r),
            channel(self.g),
            channel(self.b)
        )
    }
}

pub fn gradient_color(percentile: f64) -> Rgb {
    let p = percentile.clamp(0.0, 100.0);
    if p <= 50.0 {
        Rgb::POOR.lerp(Rgb::NEUTRAL, p / 50.0)
    } else {
        Rgb::NEUTRAL.lerp(Rgb::ELITE, (p - 50.0) / 50.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_hits_anchor_points() {
        assert_eq!(gradient_color(0.0), Rgb::POOR);
        assert_eq!(gradient_color(50.0), Rgb::NEUTRAL);
        assert_eq!(gradient_color(100.0), Rgb::ELITE);
        assert_eq!(gradient_color(150.0), Rgb::ELITE);
        let quarter = gradient_color(25.0);
        assert!((quarter.r - (0.933 + 0.988) / 2.0).abs() < 1e-12);
        assert_eq!(Rgb::ELITE.to_hex(), "#4cbb17");
    }

    #[test]
    fn single_entity_is_top_of_its_population() {
        let t = PercentileTable::build("x", [4.0], false);
        assert_eq!(t.percentile(4.0), Some(100.0));
    }
}
