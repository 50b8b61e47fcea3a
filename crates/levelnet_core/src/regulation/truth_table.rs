//! Lookup-table regulation with propagation delays and regulation-delay
//! hysteresis.

use serde::Serialize;

use super::EvalEnv;
use crate::error::{LevelNetError, Result};
use crate::model::{ElementId, TruthTableSheet};

/// What the hysteresis counter tracks between evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableMode {
    /// Restart when the regulator index tuple changes
    Reset,
    /// Restart only when the looked-up outcome changes
    NoReset,
}

impl TableMode {
    pub fn parse(cell: &str) -> Self {
        match cell.trim().to_lowercase().as_str() {
            "no-reset" | "n" | "no reset" | "noreset" | "no_reset" => TableMode::NoReset,
            _ => TableMode::Reset,
        }
    }
}

/// Per-run hysteresis state of one table-regulated element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableState {
    pub curr_reg_delay: u32,
    /// Flat index of the cell observed at the previous evaluation
    pub last_cell: Option<usize>,
}

impl TableState {
    /// Account for steps on which the element was not evaluated.
    pub fn catch_up(&mut self, skipped: usize) {
        if self.last_cell.is_some() {
            self.curr_reg_delay = self.curr_reg_delay.saturating_add(skipped as u32);
        }
    }
}

/// Dense strided table over the regulators' level ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct TruthTable {
    regulators: Vec<ElementId>,
    propagation_delays: Vec<u32>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    outcomes: Vec<usize>,
    regulation_delays: Vec<u32>,
    mode: TableMode,
}

impl TruthTable {
    /// Build from a sheet. `levels` holds the level count of every element.
    pub fn build(
        sheet: &TruthTableSheet,
        own_levels: usize,
        levels: &[usize],
        resolve: &dyn Fn(&str) -> Option<ElementId>,
    ) -> Result<Self> {
        let element = sheet.element.as_str();
        let invalid = |reason: String| LevelNetError::InvalidTruthTable {
            element: element.to_string(),
            reason,
        };

        if sheet.regulators.is_empty() {
            return Err(invalid("no regulators declared".to_string()));
        }

        let mut regulators = Vec::with_capacity(sheet.regulators.len());
        let mut propagation_delays = Vec::with_capacity(sheet.regulators.len());
        for header in &sheet.regulators {
            let header = header.trim();
            let (delay, name) = match header.split_once('~') {
                Some((d, name)) => {
                    let d: u32 = d
                        .trim()
                        .parse()
                        .map_err(|_| invalid(format!("invalid propagation delay in '{header}'")))?;
                    (d, name.trim())
                }
                None => (0, header),
            };
            let id = resolve(name).ok_or_else(|| LevelNetError::UnknownRegulator {
                element: element.to_string(),
                regulator: name.to_string(),
            })?;
            regulators.push(id);
            propagation_delays.push(delay);
        }

        let dims: Vec<usize> = regulators.iter().map(|&id| levels[id]).collect();
        let mut strides = vec![1; dims.len()];
        for i in (0..dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * dims[i + 1];
        }
        let size: usize = dims.iter().product();

        let mut outcomes: Vec<Option<usize>> = vec![None; size];
        let mut regulation_delays = vec![0; size];
        let n = regulators.len();

        for (r, row) in sheet.rows.iter().enumerate() {
            let cells: Vec<&str> = row.iter().map(|c| c.trim()).collect();
            if cells.iter().all(|c| c.is_empty()) {
                continue;
            }
            if cells.len() < n + 1 || cells.len() > n + 2 {
                return Err(invalid(format!(
                    "row {r} has {} cells, expected {} or {}",
                    cells.len(),
                    n + 1,
                    n + 2
                )));
            }
            let parse_level = |cell: &str, bound: usize| -> Result<usize> {
                cell.parse::<usize>()
                    .ok()
                    .filter(|&v| v < bound)
                    .ok_or_else(|| invalid(format!("row {r}: level '{cell}' out of range 0..{bound}")))
            };

            let mut flat = 0;
            for i in 0..n {
                flat += parse_level(cells[i], dims[i])? * strides[i];
            }
            let outcome = parse_level(cells[n], own_levels)?;
            let delay = match cells.get(n + 1) {
                Some(c) if !c.is_empty() => c
                    .parse::<u32>()
                    .map_err(|_| invalid(format!("row {r}: invalid regulation delay '{c}'")))?,
                _ => 0,
            };

            if outcomes[flat].is_some() {
                return Err(invalid(format!("row {r} repeats an earlier combination")));
            }
            outcomes[flat] = Some(outcome);
            regulation_delays[flat] = delay;
        }

        let missing = outcomes.iter().filter(|o| o.is_none()).count();
        if missing > 0 {
            return Err(invalid(format!(
                "{missing} of {size} regulator combinations have no row"
            )));
        }

        Ok(Self {
            regulators,
            propagation_delays,
            dims,
            strides,
            outcomes: outcomes.into_iter().flatten().collect(),
            regulation_delays,
            mode: TableMode::parse(&sheet.mode),
        })
    }

    pub fn regulators(&self) -> &[ElementId] {
        &self.regulators
    }

    pub fn propagation_delays(&self) -> &[u32] {
        &self.propagation_delays
    }

    pub fn mode(&self) -> TableMode {
        self.mode
    }

    /// Next level index for element `own`, before clamping.
    pub fn evaluate(
        &self,
        own: &str,
        state: &mut TableState,
        env: &mut EvalEnv<'_>,
    ) -> Result<usize> {
        let index: Vec<usize> = self
            .regulators
            .iter()
            .zip(&self.propagation_delays)
            .map(|(&id, &delay)| {
                if delay > 0 {
                    env.past_level(id, delay)
                } else {
                    env.level(id)
                }
            })
            .collect();

        let cell = self.flat_index(&index).ok_or_else(|| LevelNetError::TableIndexOutOfRange {
            element: own.to_string(),
            index: index.clone(),
        })?;

        let reg_delay = self.regulation_delays[cell];
        // last entry of the index tuple is the level held while the delay runs
        let hold = index.last().copied().unwrap_or(0);

        let next = if reg_delay > 0 {
            let changed = match (state.last_cell, self.mode) {
                (Some(prev), TableMode::Reset) => prev != cell,
                (Some(prev), TableMode::NoReset) => self.outcomes[prev] != self.outcomes[cell],
                (None, _) => false,
            };
            if changed {
                state.curr_reg_delay = 0;
                state.last_cell = None;
            }
            if state.curr_reg_delay < reg_delay {
                state.curr_reg_delay += 1;
                hold
            } else {
                let source = match self.mode {
                    TableMode::Reset => state.last_cell.unwrap_or(cell),
                    TableMode::NoReset => cell,
                };
                state.curr_reg_delay = 0;
                self.outcomes[source]
            }
        } else {
            self.outcomes[cell]
        };

        state.last_cell = Some(cell);
        Ok(next)
    }

    fn flat_index(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut flat = 0;
        for ((&i, &dim), &stride) in index.iter().zip(&self.dims).zip(&self.strides) {
            if i >= dim {
                return None;
            }
            flat += i * stride;
        }
        Some(flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DelayJitter;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn resolve(name: &str) -> Option<ElementId> {
        ["A", "B", "T"].iter().position(|n| *n == name)
    }

    fn sheet(mode: &str, regulators: &[&str], rows: &[&[&str]]) -> TruthTableSheet {
        TruthTableSheet {
            element: "T".to_string(),
            mode: mode.to_string(),
            regulators: regulators.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    /// AND gate of A and B, regulated by T itself last, 2 levels each.
    fn and_gate(mode: &str, delay: &str) -> TruthTable {
        let rows: Vec<Vec<String>> = (0..8)
            .map(|i| {
                let (a, b, t) = (i >> 2 & 1, i >> 1 & 1, i & 1);
                vec![
                    a.to_string(),
                    b.to_string(),
                    t.to_string(),
                    (a & b).to_string(),
                    delay.to_string(),
                ]
            })
            .collect();
        let sheet = TruthTableSheet {
            element: "T".to_string(),
            mode: mode.to_string(),
            regulators: vec!["A".into(), "B".into(), "T".into()],
            rows,
        };
        TruthTable::build(&sheet, 2, &[2, 2, 2], &resolve).unwrap()
    }

    fn eval(table: &TruthTable, state: &mut TableState, values: [usize; 3]) -> usize {
        let levels = [2, 2, 2];
        let history = vec![vec![]; 3];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut env = EvalEnv {
            levels: &levels,
            values: &values,
            history: &history,
            jitter: DelayJitter::Fixed,
            delta: 0,
            rng: &mut rng,
        };
        table.evaluate("T", state, &mut env).unwrap()
    }

    #[test]
    fn test_lookup_without_delay() {
        let table = and_gate("reset", "");
        let mut state = TableState::default();
        assert_eq!(eval(&table, &mut state, [1, 1, 0]), 1);
        assert_eq!(eval(&table, &mut state, [1, 0, 1]), 0);
        assert_eq!(table.mode(), TableMode::Reset);
    }

    #[test]
    fn test_reset_mode_restarts_on_index_change() {
        let table = and_gate("reset", "2");
        let mut state = TableState::default();
        // hold at T's own level while the counter runs
        assert_eq!(eval(&table, &mut state, [1, 1, 0]), 0);
        assert_eq!(state.curr_reg_delay, 1);
        // index changes: counter restarts from zero, then counts this step
        assert_eq!(eval(&table, &mut state, [1, 1, 1]), 1);
        assert_eq!(state.curr_reg_delay, 1);
        assert_eq!(eval(&table, &mut state, [1, 1, 1]), 1);
        assert_eq!(state.curr_reg_delay, 2);
        // counter satisfied: commit the outcome and reset
        assert_eq!(eval(&table, &mut state, [1, 1, 1]), 1);
        assert_eq!(state.curr_reg_delay, 0);
    }

    #[test]
    fn test_no_reset_mode_tracks_outcome() {
        let table = and_gate("no-reset", "1");
        let mut state = TableState::default();
        assert_eq!(eval(&table, &mut state, [0, 0, 1]), 1);
        assert_eq!(state.curr_reg_delay, 1);
        // different index, same outcome 0: counter keeps running
        assert_eq!(eval(&table, &mut state, [0, 1, 1]), 0);
        assert_eq!(state.curr_reg_delay, 0);
    }

    #[test]
    fn test_catch_up_only_after_first_evaluation() {
        let mut state = TableState::default();
        state.catch_up(3);
        assert_eq!(state.curr_reg_delay, 0);
        state.last_cell = Some(0);
        state.catch_up(3);
        assert_eq!(state.curr_reg_delay, 3);
    }

    #[test]
    fn test_rejects_incomplete_or_duplicate_tables() {
        let partial = sheet("reset", &["A"], &[&["0", "1"]]);
        assert!(matches!(
            TruthTable::build(&partial, 2, &[2, 2, 2], &resolve),
            Err(LevelNetError::InvalidTruthTable { .. })
        ));

        let duplicate = sheet("reset", &["A"], &[&["0", "1"], &["1", "0"], &["1", "1"]]);
        assert!(matches!(
            TruthTable::build(&duplicate, 2, &[2, 2, 2], &resolve),
            Err(LevelNetError::InvalidTruthTable { .. })
        ));

        let unknown = sheet("reset", &["Q"], &[&["0", "1"], &["1", "0"]]);
        assert!(matches!(
            TruthTable::build(&unknown, 2, &[2, 2, 2], &resolve),
            Err(LevelNetError::UnknownRegulator { .. })
        ));
    }

    #[test]
    fn test_propagation_delay_header() {
        let sheet = sheet("n", &["2~A"], &[&["0", "0"], &["1", "1"]]);
        let table = TruthTable::build(&sheet, 2, &[2, 2, 2], &resolve).unwrap();
        assert_eq!(table.propagation_delays(), &[2]);
        assert_eq!(table.mode(), TableMode::NoReset);

        let levels = [2, 2, 2];
        let values = [1, 0, 0];
        let history = vec![vec![0, 0, 1], vec![], vec![]];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut env = EvalEnv {
            levels: &levels,
            values: &values,
            history: &history,
            jitter: DelayJitter::Fixed,
            delta: 0,
            rng: &mut rng,
        };
        let mut state = TableState::default();
        assert_eq!(table.evaluate("T", &mut state, &mut env).unwrap(), 0);
    }

    #[test]
    fn test_propagation_delay_ignores_jitter() {
        // identity on A read one step back
        let sheet = sheet("reset", &["1~A"], &[&["0", "0"], &["1", "1"]]);
        let table = TruthTable::build(&sheet, 2, &[2, 2, 2], &resolve).unwrap();

        let levels = [2, 2, 2];
        let values = [0, 0, 0];
        let history = vec![vec![0, 1], vec![], vec![]];
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for _ in 0..200 {
            let mut env = EvalEnv {
                levels: &levels,
                values: &values,
                history: &history,
                jitter: DelayJitter::Uniform,
                delta: 2,
                rng: &mut rng,
            };
            let mut state = TableState::default();
            assert_eq!(table.evaluate("T", &mut state, &mut env).unwrap(), 1);
        }
    }
}
