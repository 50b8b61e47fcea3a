//! Per-step selection and commit timing for the eight update disciplines.
//!
//! | Discipline                      | Selection                       | Commit                 |
//! |---------------------------------|---------------------------------|------------------------|
//! | `ra`                            | one element (rate-weighted)     | group computes, then commits |
//! | `round`                         | all, by rank, shuffled in rank  | immediate              |
//! | `sync`, `rand_sync*`            | all                             | compute all, commit all |
//! | `sync_multi`                    | all, one gate per element/group | compute all, commit all |
//! | `ra_multi`                      | one element, one gate           | group computes, then commits |
//! | `fixed_updates`                 | named by the event trace        | immediate              |
//!
//! The compute phase reads only the value array as it stood before the phase
//! started; commits write `next_value` back into it.

use std::collections::BTreeMap;

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::config::{DelayJitter, Discipline};
use crate::element::{self, compute_next, ElementState};
use crate::error::{LevelNetError, Result};
use crate::model::{ElementId, Registry};
use crate::regulation::EvalEnv;

/// Mutable state of one run: current levels, per-element state machines and
/// the committed level history read by propagation delays.
#[derive(Debug, Clone)]
pub struct RunState {
    pub values: Vec<usize>,
    pub states: Vec<ElementState>,
    /// Committed levels per element; entry 0 is the initial value
    pub history: Vec<Vec<usize>>,
}

impl RunState {
    pub fn new(registry: &Registry, initial: Vec<usize>) -> Self {
        let states = registry
            .elements()
            .iter()
            .zip(&initial)
            .map(|(config, &level)| ElementState::new(config, level))
            .collect();
        let history = initial.iter().map(|&level| vec![level]).collect();
        Self {
            values: initial,
            states,
            history,
        }
    }

    /// Append the current levels to the history.
    pub fn record(&mut self) {
        for (past, &value) in self.history.iter_mut().zip(&self.values) {
            past.push(value);
        }
    }

    fn hold(&mut self, id: ElementId) {
        self.states[id].next_value = self.values[id];
    }

    fn commit(&mut self, id: ElementId) {
        element::commit(&mut self.values, id, &self.states[id]);
    }
}

pub struct Scheduler {
    discipline: Discipline,
    jitter: DelayJitter,
    /// Rate-weighted sampler over the update list, when any rate is declared
    weights: Option<WeightedIndex<u32>>,
    /// Update-list elements grouped by rank, highest rank first
    ranks: Vec<Vec<ElementId>>,
}

impl Scheduler {
    pub fn new(registry: &Registry, discipline: Discipline) -> Result<Self> {
        let update_list = registry.update_list();

        let weights = if registry.rate_weighted() {
            let rates = update_list
                .iter()
                .map(|&id| registry.element(id).rate.unwrap_or(1));
            let sampler = WeightedIndex::new(rates).map_err(|_| LevelNetError::InvalidField {
                element: registry.element(update_list[0]).name.clone(),
                field: "update rate",
                value: "0".to_string(),
            })?;
            Some(sampler)
        } else {
            None
        };

        let mut by_rank: BTreeMap<i64, Vec<ElementId>> = BTreeMap::new();
        for &id in update_list {
            by_rank.entry(registry.element(id).rank).or_default().push(id);
        }
        let ranks = by_rank.into_values().rev().collect();

        Ok(Self {
            discipline,
            jitter: discipline.delay_jitter(),
            weights,
            ranks,
        })
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Run one step. Returns the selected element for single-selection
    /// disciplines; `fixed` names it for `fixed_updates`.
    pub fn step(
        &self,
        registry: &Registry,
        run: &mut RunState,
        step: usize,
        fixed: Option<ElementId>,
        rng: &mut ChaCha8Rng,
    ) -> Result<Option<ElementId>> {
        match self.discipline {
            Discipline::Ra => {
                let Some(id) = self.select(registry, rng) else {
                    return Ok(None);
                };
                let members = registry.group_members(id);
                for &member in &members {
                    self.compute(registry, run, member, step, rng)?;
                }
                for &member in &members {
                    run.commit(member);
                }
                Ok(Some(id))
            }
            Discipline::Round => {
                for rank in &self.ranks {
                    let mut order = rank.clone();
                    order.shuffle(rng);
                    for id in order {
                        self.compute(registry, run, id, step, rng)?;
                        run.commit(id);
                    }
                }
                Ok(None)
            }
            Discipline::Sync | Discipline::RandSync | Discipline::RandSyncGauss => {
                for &id in registry.update_list() {
                    self.compute(registry, run, id, step, rng)?;
                }
                for &id in registry.update_list() {
                    run.commit(id);
                }
                Ok(None)
            }
            Discipline::SyncMulti => {
                let mut visited = vec![false; registry.len()];
                for &id in registry.update_list() {
                    if visited[id] {
                        continue;
                    }
                    let passed = gate(registry, id, rng);
                    for member in registry.group_members(id) {
                        visited[member] = true;
                        if passed {
                            self.compute(registry, run, member, step, rng)?;
                        } else {
                            run.hold(member);
                        }
                    }
                }
                for &id in registry.update_list() {
                    run.commit(id);
                }
                Ok(None)
            }
            Discipline::RaMulti => {
                // the selection is reported even when the gate holds the group,
                // so event traces stay one name per step
                let Some(id) = self.select(registry, rng) else {
                    return Ok(None);
                };
                let passed = gate(registry, id, rng);
                let members = registry.group_members(id);
                for &member in &members {
                    if passed {
                        self.compute(registry, run, member, step, rng)?;
                    } else {
                        run.hold(member);
                    }
                }
                for &member in &members {
                    run.commit(member);
                }
                Ok(Some(id))
            }
            Discipline::FixedUpdates => {
                let Some(id) = fixed else {
                    return Ok(None);
                };
                self.compute(registry, run, id, step, rng)?;
                run.commit(id);
                Ok(Some(id))
            }
        }
    }

    /// Pick one element from the update list, rate-weighted when configured.
    fn select(&self, registry: &Registry, rng: &mut ChaCha8Rng) -> Option<ElementId> {
        let update_list = registry.update_list();
        if update_list.is_empty() {
            return None;
        }
        let pos = match &self.weights {
            Some(weights) => weights.sample(rng),
            None => rng.gen_range(0..update_list.len()),
        };
        Some(update_list[pos])
    }

    fn compute(
        &self,
        registry: &Registry,
        run: &mut RunState,
        id: ElementId,
        step: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<()> {
        let config = registry.element(id);
        let RunState {
            values,
            states,
            history,
        } = run;
        let mut env = EvalEnv {
            levels: registry.levels(),
            values: values.as_slice(),
            history: history.as_slice(),
            jitter: self.jitter,
            delta: config.delta,
            rng,
        };
        let next = compute_next(config, &mut states[id], id, step, &mut env)?;
        states[id].next_value = next;
        Ok(())
    }
}

/// Probability gate; a pass lets the element (and its group) compute.
fn gate(registry: &Registry, id: ElementId, rng: &mut ChaCha8Rng) -> bool {
    rng.gen::<f64>() < registry.element(id).probability
}
