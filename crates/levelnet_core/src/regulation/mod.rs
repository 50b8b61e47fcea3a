//! Regulation evaluators: the activator/inhibitor expression language and
//! multi-dimensional truth tables.
//!
//! Both read regulator levels through an [`EvalEnv`], which exposes the
//! pre-step value snapshot and the per-run committed history used by
//! propagation delays.

pub mod expression;
pub mod truth_table;

use rand::{Rng, RngCore};

use crate::config::DelayJitter;
use crate::model::ElementId;

pub use expression::{Combine, Expression, Group, Source, Term};
pub use truth_table::{TableMode, TableState, TruthTable};

/// Read-only view of the network during one evaluation.
pub struct EvalEnv<'a> {
    /// Level count per element
    pub levels: &'a [usize],
    /// Current level index per element (pre-commit snapshot)
    pub values: &'a [usize],
    /// Committed level indices per element, entry 0 = initial value
    pub history: &'a [Vec<usize>],
    pub jitter: DelayJitter,
    /// Jitter radius of the element being evaluated
    pub delta: u32,
    pub rng: &'a mut dyn RngCore,
}

impl<'a> EvalEnv<'a> {
    pub fn level(&self, id: ElementId) -> usize {
        self.values[id]
    }

    pub fn max_level(&self, id: ElementId) -> usize {
        self.levels[id] - 1
    }

    /// `level / (levels - 1)`, in `[0, 1]`.
    pub fn normalized(&self, id: ElementId, level: usize) -> f64 {
        level as f64 / self.max_level(id) as f64
    }

    /// Level of `id` exactly `delay` steps in the past.
    ///
    /// Delay 0 reads the current value; delays reaching past the start of the
    /// run read the initial value.
    pub fn past_level(&self, id: ElementId, delay: u32) -> usize {
        let delay = delay as usize;
        let past = &self.history[id];
        if delay == 0 || past.is_empty() {
            self.values[id]
        } else if delay < past.len() {
            past[past.len() - delay]
        } else {
            past[0]
        }
    }

    /// Like [`past_level`](Self::past_level), with `delay` redrawn under the
    /// active jitter mode first.
    pub fn delayed_level(&mut self, id: ElementId, delay: u32) -> usize {
        let delay = jitter_delay(delay, self.delta, self.jitter, self.rng);
        self.past_level(id, delay)
    }
}

/// Redraw a delay for the randomized-delay disciplines, clamped to `>= 0`.
pub fn jitter_delay(delay: u32, delta: u32, mode: DelayJitter, rng: &mut dyn RngCore) -> u32 {
    if delta == 0 {
        return delay;
    }
    let drawn = match mode {
        DelayJitter::Fixed => return delay,
        DelayJitter::Uniform => {
            let lo = delay as i64 - delta as i64;
            let hi = delay as i64 + delta as i64;
            rng.gen_range(lo..=hi)
        }
        DelayJitter::Gaussian => {
            // Box-Muller
            let u1: f64 = rng.gen();
            let u2: f64 = rng.gen();
            let u1 = if u1 < 1e-10 { 1e-10 } else { u1 };
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            (delay as f64 + delta as f64 * z).round() as i64
        }
    };
    drawn.max(0) as u32
}
