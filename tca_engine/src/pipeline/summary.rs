//! Notional-weighted roll-ups of a computed metric column.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{TagField, TradeTable};

/// Aggregate of one group of trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub count: usize,
    pub notional: f64,
    /// `sum(|notional| * value) / sum(|notional|)`; `None` when no notional.
    pub weighted_average: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsSummary {
    pub column: String,
    pub groups: BTreeMap<String, GroupStats>,
}

impl ResultsSummary {
    /// Group label for trades missing the tag.
    pub const UNTAGGED: &'static str = "untagged";
    /// Group label when no tag is requested.
    pub const ALL: &'static str = "all";

    /// Summarises `column` over `table`, optionally grouped by a tag.
    ///
    /// Rows without the column are not counted.
    pub fn weighted_by_notional(table: &TradeTable, column: &str, group_by: Option<TagField>) -> Self {
        let mut acc: BTreeMap<String, (usize, f64, f64)> = BTreeMap::new();
        for row in &table.rows {
            let Some(value) = row.field(column) else {
                continue;
            };
            let key = match group_by {
                Some(tag) => row.tag(tag).unwrap_or(Self::UNTAGGED).to_string(),
                None => Self::ALL.to_string(),
            };
            let weight = row.executed_notional.abs();
            let e = acc.entry(key).or_insert((0, 0.0, 0.0));
            e.0 += 1;
            e.1 += weight;
            e.2 += weight * value;
        }

        let groups = acc
            .into_iter()
            .map(|(k, (count, notional, weighted))| {
                let weighted_average = (notional > 0.0).then(|| weighted / notional);
                (
                    k,
                    GroupStats {
                        count,
                        notional,
                        weighted_average,
                    },
                )
            })
            .collect();

        Self {
            column: column.to_string(),
            groups,
        }
    }
}
