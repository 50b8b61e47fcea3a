//! Event-trace schedules for `fixed_updates`.
//!
//! A `Run #<n>` line starts run `n`; every other non-empty line contributes
//! whitespace-separated element names, one per step, to the current run.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::{LevelNetError, Result};
use crate::model::{ElementId, Registry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTrace {
    runs: Vec<Vec<ElementId>>,
}

impl EventTrace {
    pub fn read(path: &Path, registry: &Registry) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, registry)
    }

    pub fn parse(text: &str, registry: &Registry) -> Result<Self> {
        let mut runs: Vec<Vec<ElementId>> = Vec::new();
        let mut current = 0;

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix("Run #") {
                current = rest.trim().parse().map_err(|_| {
                    LevelNetError::EventTrace(format!("line {}: bad run header '{line}'", lineno + 1))
                })?;
                if runs.len() <= current {
                    runs.resize(current + 1, Vec::new());
                }
                continue;
            }
            if runs.len() <= current {
                runs.resize(current + 1, Vec::new());
            }
            for name in line.split_whitespace() {
                let id = registry.id_of(name).ok_or_else(|| {
                    LevelNetError::EventTrace(format!(
                        "line {}: unknown element '{name}'",
                        lineno + 1
                    ))
                })?;
                runs[current].push(id);
            }
        }

        if runs.is_empty() {
            return Err(LevelNetError::EventTrace("no runs in event trace".to_string()));
        }
        Ok(Self { runs })
    }

    pub fn runs(&self) -> usize {
        self.runs.len()
    }

    pub fn schedule(&self, run: usize) -> &[ElementId] {
        &self.runs[run]
    }

    /// Step count to simulate: the last run's schedule length.
    ///
    /// A mismatch with `requested` is logged and the schedule wins; any run
    /// shorter than the result is an error.
    pub fn reconcile_steps(&self, requested: usize) -> Result<usize> {
        let scheduled = self.runs.last().map_or(0, Vec::len);
        if scheduled != requested {
            warn!(
                requested,
                scheduled, "step count does not match event trace, using trace length"
            );
        }
        if let Some((run, short)) = self
            .runs
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() < scheduled)
        {
            return Err(LevelNetError::EventTrace(format!(
                "run {run} schedules {} steps, expected {scheduled}",
                short.len()
            )));
        }
        Ok(scheduled)
    }
}
