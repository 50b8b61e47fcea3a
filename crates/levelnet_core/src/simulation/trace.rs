//! Trace file rendering.
//!
//! Output streams to `<path>.partial` and is renamed into place by
//! [`TraceWriter::finish`]. A writer dropped before `finish` removes the
//! partial file, so a failed simulation never leaves a truncated trace behind.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use super::aggregate::Aggregate;
use crate::config::OutputMode;
use crate::error::Result;
use crate::model::{ElementId, Registry};
use crate::scheduler::RunState;

pub struct TraceWriter<'a> {
    registry: &'a Registry,
    mode: OutputMode,
    normalize: bool,
    out: Option<BufWriter<File>>,
    partial: PathBuf,
    target: PathBuf,
}

impl<'a> TraceWriter<'a> {
    pub fn create(
        path: &Path,
        registry: &'a Registry,
        mode: OutputMode,
        normalize: bool,
    ) -> Result<Self> {
        let mut partial = path.as_os_str().to_owned();
        partial.push(".partial");
        let partial = PathBuf::from(partial);
        let out = BufWriter::new(File::create(&partial)?);
        Ok(Self {
            registry,
            mode,
            normalize,
            out: Some(out),
            partial,
            target: path.to_path_buf(),
        })
    }

    /// Render one committed level.
    pub fn level(&self, id: ElementId, level: usize) -> String {
        if self.normalize {
            format!("{:?}", self.scaled(id, level))
        } else {
            level.to_string()
        }
    }

    /// Level as accumulated: raw index or `level / (levels - 1)`.
    pub fn scaled(&self, id: ElementId, level: usize) -> f64 {
        if self.normalize {
            level as f64 / (self.registry.levels()[id] - 1) as f64
        } else {
            level as f64
        }
    }

    fn accumulated(&self, value: f64) -> String {
        if self.normalize {
            format!("{value:?}")
        } else {
            format!("{}", value.round() as u64)
        }
    }

    fn level_column(&self, id: ElementId) -> usize {
        if self.normalize {
            2
        } else {
            self.registry.levels()[id]
        }
    }

    /// Per-run block; `selected` is the element chosen at each step.
    pub fn write_run(
        &mut self,
        run: usize,
        state: &RunState,
        steps: usize,
        selected: &[ElementId],
    ) -> Result<()> {
        let mut text = String::new();
        match self.mode {
            OutputMode::Full => {
                text.push_str(&format!("Run #{run}\n"));
                for &id in self.registry.sorted_ids() {
                    let values: Vec<String> =
                        state.history[id].iter().map(|&v| self.level(id, v)).collect();
                    text.push_str(&format!(
                        "{}|{}| {}\n",
                        self.registry.element(id).name,
                        self.level_column(id),
                        values.join(" ")
                    ));
                }
            }
            OutputMode::Transpose => {
                let sorted = self.registry.sorted_ids();
                if run == 0 {
                    let names: Vec<&str> = sorted
                        .iter()
                        .map(|&id| self.registry.element(id).name.as_str())
                        .collect();
                    text.push_str(&format!("# time {} step\n", names.join(" ")));
                }
                for step in 0..steps {
                    let row: Vec<String> = sorted
                        .iter()
                        .map(|&id| self.level(id, state.history[id][step]))
                        .collect();
                    text.push_str(&format!("{step}  {} {step}\n", row.join(" ")));
                }
            }
            OutputMode::EventTrace => {
                let names: Vec<&str> = selected
                    .iter()
                    .map(|&id| self.registry.element(id).name.as_str())
                    .collect();
                text.push_str(&format!("Run #{run}\n{}\n", names.join(" ")));
            }
            OutputMode::Summary => {}
        }
        self.write(&text)
    }

    /// Frequency and squares summaries for modes that carry them.
    pub fn write_summary(&mut self, aggregate: &Aggregate) -> Result<()> {
        if !matches!(self.mode, OutputMode::Full | OutputMode::Summary) {
            return Ok(());
        }
        let mut text = String::new();
        if self.mode == OutputMode::Summary {
            text.push_str(&format!("Run #{}\n", aggregate.runs().saturating_sub(1)));
        }
        text.push_str("Frequency Summary:\n");
        self.summary_block(&mut text, |id| aggregate.sums(id));
        text.push_str("\nSquares Summary:\n");
        self.summary_block(&mut text, |id| aggregate.squares(id));
        self.write(&text)
    }

    fn summary_block<'b>(&self, text: &mut String, column: impl Fn(ElementId) -> &'b [f64]) {
        for &id in self.registry.sorted_ids() {
            let values: Vec<String> = column(id).iter().map(|&v| self.accumulated(v)).collect();
            text.push_str(&format!(
                "{}|{}| {}\n",
                self.registry.element(id).name,
                self.level_column(id),
                values.join(" ")
            ));
        }
    }

    fn write(&mut self, text: &str) -> Result<()> {
        if let Some(out) = self.out.as_mut() {
            out.write_all(text.as_bytes())?;
        }
        Ok(())
    }

    /// Flush and move the partial file into place.
    pub fn finish(mut self) -> Result<PathBuf> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }
        fs::rename(&self.partial, &self.target)?;
        Ok(self.target.clone())
    }
}

impl Drop for TraceWriter<'_> {
    fn drop(&mut self) {
        // still open: finish was never reached
        if self.out.take().is_some() {
            if let Err(err) = fs::remove_file(&self.partial) {
                warn!(path = %self.partial.display(), %err, "could not remove partial trace");
            }
        }
    }
}
