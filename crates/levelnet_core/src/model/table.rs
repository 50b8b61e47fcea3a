//! Normalized model-table contract.
//!
//! The loader that produces these tables (spreadsheets, CSV exports) lives
//! outside the core; everything here is plain string cells.

use serde::{Deserialize, Serialize};

use crate::error::{LevelNetError, Result};

/// One row per element plus auxiliary truth-table sheets keyed by element name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub truth_tables: Vec<TruthTableSheet>,
}

/// Lookup-table regulation for a single element.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TruthTableSheet {
    /// Regulated element
    pub element: String,
    /// `reset` / `no-reset` cell; blank means reset
    pub mode: String,
    /// Regulator headers in index order, optionally `d~name`
    pub regulators: Vec<String>,
    /// Regulator levels, outcome level, optional regulation delay
    pub rows: Vec<Vec<String>>,
}

impl ModelTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
            truth_tables: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn truth_table_for(&self, element: &str) -> Option<&TruthTableSheet> {
        self.truth_tables.iter().find(|t| t.element == element)
    }
}

/// Column indices resolved from the header row.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    pub variable: usize,
    pub positive: usize,
    pub negative: usize,
    pub scenarios: Vec<usize>,
    pub levels: Option<usize>,
    pub increment: Option<usize>,
    pub delays: Option<usize>,
    pub spontaneous: Option<usize>,
    pub balancing: Option<usize>,
    pub update_group: Option<usize>,
    pub update_rate: Option<usize>,
    pub update_rank: Option<usize>,
    pub update_probability: Option<usize>,
    pub optimization_input: Option<usize>,
    pub optimization_fixed: Option<usize>,
    pub optimization_objective: Option<usize>,
    pub noise: Option<usize>,
    pub delta: Option<usize>,
}

impl ColumnLayout {
    /// Match headers by case-insensitive substring.
    pub fn discover(headers: &[String]) -> Result<Self> {
        let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let matching = |keys: &[&str]| -> Vec<usize> {
            lowered
                .iter()
                .enumerate()
                .filter(|(_, h)| keys.iter().any(|k| h.contains(k)))
                .map(|(i, _)| i)
                .collect()
        };
        let first = |keys: &[&str]| matching(keys).first().copied();

        let variable = matching(&["variable"]);
        let positive = matching(&["positive"]);
        let negative = matching(&["negative"]);
        let scenarios = matching(&["initial", "scenario"]);

        if variable.is_empty() || positive.is_empty() || negative.is_empty() || scenarios.is_empty()
        {
            return Err(LevelNetError::MissingColumn(
                "Variable, Positive, Negative, Scenario".to_string(),
            ));
        }
        if variable.len() > 1 || positive.len() > 1 || negative.len() > 1 {
            return Err(LevelNetError::DuplicateColumn(
                "Variable, Positive, Negative".to_string(),
            ));
        }
        for (pos, &i) in scenarios.iter().enumerate() {
            if scenarios[..pos].iter().any(|&j| lowered[j] == lowered[i]) {
                return Err(LevelNetError::DuplicateColumn(headers[i].trim().to_string()));
            }
        }

        Ok(Self {
            variable: variable[0],
            positive: positive[0],
            negative: negative[0],
            scenarios,
            levels: first(&["states", "levels"]),
            increment: first(&["increment"]),
            delays: first(&["timing", "delay"]),
            spontaneous: first(&["spontaneous"]),
            balancing: first(&["balancing"]),
            update_group: first(&["update group"]),
            update_rate: first(&["update rate"]),
            update_rank: first(&["update rank"]),
            update_probability: first(&["update probability"]),
            optimization_input: first(&["optimization input"]),
            optimization_fixed: first(&["optimization fixed"]),
            optimization_objective: first(&["optimization objective"]),
            noise: first(&["noise"]),
            delta: first(&["delta"]),
        })
    }
}

/// Trimmed cell text, blank when the row is short.
pub(crate) fn cell(row: &[String], column: Option<usize>) -> &str {
    column
        .and_then(|c| row.get(c))
        .map(|s| s.trim())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_discover_required_and_optional() {
        let layout = ColumnLayout::discover(&headers(&[
            "Variable",
            "Positive",
            "Negative",
            "Levels",
            "Delays",
            "Scenario 0",
            "Scenario 1",
            "Update Rate",
            "Noise",
        ]))
        .unwrap();
        assert_eq!(layout.variable, 0);
        assert_eq!(layout.scenarios, vec![5, 6]);
        assert_eq!(layout.levels, Some(3));
        assert_eq!(layout.delays, Some(4));
        assert_eq!(layout.update_rate, Some(7));
        assert_eq!(layout.update_rank, None);
        assert_eq!(layout.noise, Some(8));
        assert_eq!(layout.delta, None);
    }

    #[test]
    fn test_missing_required_column() {
        let err = ColumnLayout::discover(&headers(&["Variable", "Positive", "Initial"]));
        assert!(matches!(err, Err(LevelNetError::MissingColumn(_))));
    }

    #[test]
    fn test_duplicate_columns() {
        let err = ColumnLayout::discover(&headers(&[
            "Variable", "Positive", "Positive list", "Negative", "Initial",
        ]));
        assert!(matches!(err, Err(LevelNetError::DuplicateColumn(_))));

        let err = ColumnLayout::discover(&headers(&[
            "Variable", "Positive", "Negative", "Initial", "initial",
        ]));
        assert!(matches!(err, Err(LevelNetError::DuplicateColumn(_))));
    }
}
