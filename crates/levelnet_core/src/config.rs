use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[cfg(feature = "cli")]
use clap::{Args, ValueEnum};

/// Update discipline: which elements compute each step and when results commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
pub enum Discipline {
    /// Random asynchronous: one element (or its group) per step
    #[cfg_attr(feature = "cli", value(name = "ra"))]
    Ra,
    /// Every element once per round, highest rank first, shuffled within a rank
    #[cfg_attr(feature = "cli", value(name = "round"))]
    Round,
    /// Compute all, then commit all
    #[cfg_attr(feature = "cli", value(name = "sync"))]
    Sync,
    /// One element per step behind a probability gate
    #[cfg_attr(feature = "cli", value(name = "ra_multi"))]
    RaMulti,
    /// Every element behind an independent probability gate, then commit all
    #[cfg_attr(feature = "cli", value(name = "sync_multi"))]
    SyncMulti,
    /// Synchronous with delays redrawn uniformly from `D ± delta`
    #[cfg_attr(feature = "cli", value(name = "rand_sync"))]
    RandSync,
    /// Synchronous with delays redrawn from `Normal(D, delta)`
    #[cfg_attr(feature = "cli", value(name = "rand_sync_gauss"))]
    RandSyncGauss,
    /// Update order read from an event-trace file
    #[cfg_attr(feature = "cli", value(name = "fixed_updates"))]
    FixedUpdates,
}

/// How transition delays are drawn on every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayJitter {
    Fixed,
    Uniform,
    Gaussian,
}

impl Discipline {
    /// Disciplines that update every element from one pre-step snapshot.
    pub fn is_synchronous(self) -> bool {
        matches!(
            self,
            Discipline::Sync | Discipline::SyncMulti | Discipline::RandSync | Discipline::RandSyncGauss
        )
    }

    /// Disciplines that update exactly one selected element per step.
    pub fn selects_single(self) -> bool {
        matches!(
            self,
            Discipline::Ra | Discipline::RaMulti | Discipline::FixedUpdates
        )
    }

    pub fn delay_jitter(self) -> DelayJitter {
        match self {
            Discipline::RandSync => DelayJitter::Uniform,
            Discipline::RandSyncGauss => DelayJitter::Gaussian,
            _ => DelayJitter::Fixed,
        }
    }
}

/// Trace file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "cli", derive(ValueEnum))]
pub enum OutputMode {
    /// Per-run traces followed by frequency and squares summaries
    Full,
    /// Time-major matrix, one row per step, one column per element
    Transpose,
    /// Run count plus frequency and squares summaries
    Summary,
    /// Per-run list of selected element names, replayable with fixed_updates.
    /// Under ra_multi a name is recorded even when its gate held it, and
    /// fixed_updates evaluates it, so that replay is not exact.
    EventTrace,
}

impl OutputMode {
    /// Numeric mode codes used by downstream tooling (1, 2, 3 and 7).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(OutputMode::Full),
            2 => Some(OutputMode::Transpose),
            3 => Some(OutputMode::Summary),
            7 => Some(OutputMode::EventTrace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(Args))]
pub struct SimulationConfig {
    /// Update discipline
    #[cfg_attr(feature = "cli", arg(long, value_enum, default_value_t = Discipline::Ra))]
    pub discipline: Discipline,

    /// Number of independent runs
    #[cfg_attr(feature = "cli", arg(long, default_value_t = 100))]
    pub runs: usize,

    /// Steps per run
    #[cfg_attr(feature = "cli", arg(long, default_value_t = 1000))]
    pub steps: usize,

    /// Trace output path
    #[cfg_attr(feature = "cli", arg(long, short = 'o', default_value = "traces.txt"))]
    pub output: PathBuf,

    /// Scenario column index (zero-indexed)
    #[cfg_attr(feature = "cli", arg(long, default_value_t = 0))]
    pub scenario: usize,

    /// Trace output layout
    #[cfg_attr(feature = "cli", arg(long, value_enum, default_value_t = OutputMode::Full))]
    pub output_mode: OutputMode,

    /// Write levels normalized to [0, 1] instead of raw indices
    #[cfg_attr(feature = "cli", arg(long))]
    pub normalize: bool,

    /// Redraw "random" initial values at the start of every run
    #[cfg_attr(feature = "cli", arg(long))]
    pub randomize_each_run: bool,

    /// Event-trace file for the fixed_updates discipline
    #[cfg_attr(feature = "cli", arg(long))]
    pub event_traces: Option<PathBuf>,

    /// RNG seed (drawn from entropy when omitted)
    #[cfg_attr(feature = "cli", arg(long))]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            discipline: Discipline::Ra,
            runs: 100,
            steps: 1000,
            output: PathBuf::from("traces.txt"),
            scenario: 0,
            output_mode: OutputMode::Full,
            normalize: false,
            randomize_each_run: false,
            event_traces: None,
            seed: None,
        }
    }
}

/// Values applied when an optional model-table cell is blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefaults {
    #[serde(default = "default_levels")]
    pub levels: usize,
    /// Increment slope; 0 means a fixed step of one level
    #[serde(default = "default_increment")]
    pub increment: f64,
    #[serde(default = "default_noise")]
    pub noise: u32,
    /// Jitter radius for the randomized-delay disciplines
    #[serde(default = "default_delta")]
    pub delta: u32,
    /// Tie-break policy, same cell syntax as the balancing column
    #[serde(default = "default_balancing")]
    pub balancing: String,
    #[serde(default)]
    pub spontaneous: u32,
    #[serde(default = "default_update_probability")]
    pub update_probability: f64,
    #[serde(default)]
    pub update_rank: i64,
}

fn default_levels() -> usize {
    3
}
fn default_increment() -> f64 {
    1.0
}
fn default_noise() -> u32 {
    1
}
fn default_delta() -> u32 {
    2
}
fn default_balancing() -> String {
    "decrease,0".to_string()
}
fn default_update_probability() -> f64 {
    0.5
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            levels: default_levels(),
            increment: default_increment(),
            noise: default_noise(),
            delta: default_delta(),
            balancing: default_balancing(),
            spontaneous: 0,
            update_probability: default_update_probability(),
            update_rank: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_mode_codes() {
        assert_eq!(OutputMode::from_code(1), Some(OutputMode::Full));
        assert_eq!(OutputMode::from_code(2), Some(OutputMode::Transpose));
        assert_eq!(OutputMode::from_code(3), Some(OutputMode::Summary));
        assert_eq!(OutputMode::from_code(7), Some(OutputMode::EventTrace));
        assert_eq!(OutputMode::from_code(4), None);
    }

    #[test]
    fn test_discipline_families() {
        assert!(Discipline::RandSyncGauss.is_synchronous());
        assert!(!Discipline::Round.is_synchronous());
        assert!(Discipline::FixedUpdates.selects_single());
        assert_eq!(Discipline::RandSync.delay_jitter(), DelayJitter::Uniform);
        assert_eq!(Discipline::Sync.delay_jitter(), DelayJitter::Fixed);
    }
}
