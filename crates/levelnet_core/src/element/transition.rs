//! Delayed, noise-tolerant level transitions.
//!
//! An element moves one step (or `ceil(slope * score * (L-1))` levels) in the
//! direction its regulation points, but only once the matching delay counter
//! has reached `D` and at least `D - noise` of the last `D` recorded markers
//! agree with the direction. The marker for the current evaluation is pushed
//! after the decision.

use super::state::{ElementState, Marker, MARKER_DOWN, MARKER_HOLD, MARKER_UP};
use crate::error::Result;
use crate::model::{Balancing, Direction, ElementConfig, ElementId, RegulationKind};
use crate::regulation::{jitter_delay, EvalEnv};

/// Delays in force for one evaluation, after jitter.
#[derive(Debug, Clone, PartialEq)]
struct DelayPlan {
    transitions: Vec<u32>,
    spontaneous: Option<u32>,
    balancing: Option<Balancing>,
}

impl DelayPlan {
    fn draw(config: &ElementConfig, env: &mut EvalEnv<'_>) -> Self {
        let (delta, mode) = (env.delta, env.jitter);
        let spontaneous = config.spontaneous.map(|d| {
            if d == 0 {
                0
            } else {
                jitter_delay(d, delta, mode, env.rng)
            }
        });
        let balancing = config.balancing.map(|b| Balancing {
            direction: b.direction,
            delay: jitter_delay(b.delay, delta, mode, env.rng),
        });
        let transitions = config
            .delays
            .iter()
            .map(|&d| {
                if d == 0 {
                    0
                } else {
                    jitter_delay(d, delta, mode, env.rng)
                }
            })
            .collect();
        Self {
            transitions,
            spontaneous,
            balancing,
        }
    }
}

/// Slot of the rising-edge delay out of `level`.
pub fn up_index(level: usize) -> usize {
    level
}

/// Slot of the falling-edge delay out of `level`; level 0 maps to slot 0.
pub fn down_index(level: usize, levels: usize) -> usize {
    if level == 0 {
        0
    } else {
        2 * (levels - 1) - level
    }
}

/// Evaluate element `id` at `step` and return its clamped next level.
///
/// Reads only the pre-step snapshot in `env`; the caller commits the result.
pub fn compute_next(
    config: &ElementConfig,
    state: &mut ElementState,
    id: ElementId,
    step: usize,
    env: &mut EvalEnv<'_>,
) -> Result<usize> {
    let current = env.level(id);
    let skipped = skipped_steps(state.last_update_step, step);

    let next = match &config.regulation {
        RegulationKind::Table(table) => {
            state.table.catch_up(skipped);
            state.last_update_step = step;
            table.evaluate(&config.name, &mut state.table, env)? as i64
        }
        RegulationKind::Expression {
            activators,
            inhibitors,
        } => {
            let y_act = activators.as_ref().map(|e| e.score(id, env));
            let y_inh = inhibitors.as_ref().map(|e| e.score(id, env));
            let plan = DelayPlan::draw(config, env);
            catch_up(config, state, current, skipped, &plan);
            state.last_update_step = step;
            decide(config, state, current, y_act, y_inh, &plan)
        }
    };

    Ok(next.clamp(0, config.max_level() as i64) as usize)
}

/// Steps the element missed since its last evaluation.
fn skipped_steps(last_update_step: usize, step: usize) -> usize {
    if last_update_step > 0 && step > 1 {
        step.saturating_sub(last_update_step).saturating_sub(1)
    } else {
        0
    }
}

/// Replay the last marker and advance every active counter once per skipped step.
fn catch_up(
    config: &ElementConfig,
    state: &mut ElementState,
    current: usize,
    skipped: usize,
    plan: &DelayPlan,
) {
    if skipped == 0 {
        return;
    }
    if let Some(last) = state.scores.last() {
        for _ in 0..skipped {
            state.scores.push(last);
        }
    }
    let bump = skipped as u32;
    if current < config.max_level() {
        let slot = &mut state.curr_delays[up_index(current)];
        *slot = slot.saturating_add(bump);
    }
    if current > 0 {
        let slot = &mut state.curr_delays[down_index(current, config.levels)];
        *slot = slot.saturating_add(bump);
    }
    if plan.spontaneous.is_some() {
        state.curr_spontaneous = state.curr_spontaneous.saturating_add(bump);
    }
    if plan.balancing.is_some() {
        state.curr_balancing = state.curr_balancing.saturating_add(bump);
    }
}

/// Advance `counter` or fire: true when the delay condition holds.
fn gate(counter: &mut u32, seen: usize, delay: u32, noise: u32) -> bool {
    let ready = seen >= delay.saturating_sub(noise) as usize && *counter >= delay;
    if ready {
        *counter = 0;
    } else {
        *counter += 1;
    }
    ready
}

fn decide(
    config: &ElementConfig,
    state: &mut ElementState,
    current: usize,
    y_act: Option<f64>,
    y_inh: Option<f64>,
    plan: &DelayPlan,
) -> i64 {
    let level = current as i64;
    let (step, full) = magnitudes(config, y_act, y_inh);

    let transition = |state: &mut ElementState, marker: Marker| -> i64 {
        let (slot, sign) = if marker == MARKER_UP {
            (up_index(current), 1)
        } else {
            (down_index(current, config.levels), -1)
        };
        let delay = plan.transitions[slot];
        let seen = state.scores.count_recent(delay, marker);
        let fired = gate(&mut state.curr_delays[slot], seen, delay, config.noise);
        state.scores.push(marker);
        if fired {
            level + sign * step
        } else {
            level
        }
    };

    let spontaneous = |state: &mut ElementState, sign: i64| -> i64 {
        let moved = match plan.spontaneous {
            Some(delay) => {
                let seen = state.scores.count_recent(delay, MARKER_HOLD);
                gate(&mut state.curr_spontaneous, seen, delay, config.noise)
            }
            None => false,
        };
        state.scores.push(MARKER_HOLD);
        if moved {
            level + sign * full
        } else {
            level
        }
    };

    match (y_act, y_inh) {
        (Some(a), None) if a > 0.0 => transition(state, MARKER_UP),
        (Some(a), None) if a == 0.0 => spontaneous(state, -1),
        (None, Some(i)) if i > 0.0 => transition(state, MARKER_DOWN),
        (None, Some(i)) if i == 0.0 => spontaneous(state, 1),
        (Some(a), Some(i)) if a > i => transition(state, MARKER_UP),
        (Some(a), Some(i)) if a < i => transition(state, MARKER_DOWN),
        (Some(_), Some(_)) => {
            let moved = match plan.balancing {
                Some(b) => {
                    let seen = state.scores.count_recent(b.delay, MARKER_HOLD);
                    let fired = gate(&mut state.curr_balancing, seen, b.delay, config.noise);
                    match (fired, b.direction) {
                        (false, _) => 0,
                        (true, Direction::Increase) => full,
                        (true, Direction::Decrease) => -full,
                    }
                }
                None => 0,
            };
            state.scores.push(MARKER_HOLD);
            level + moved
        }
        // negative scores from negative weights, or no regulation at all
        _ => level,
    }
}

/// (transition step, spontaneous/balancing step)
fn magnitudes(config: &ElementConfig, y_act: Option<f64>, y_inh: Option<f64>) -> (i64, i64) {
    if config.increment_slope == 0.0 {
        return (1, 1);
    }
    let score = match (y_act, y_inh) {
        (Some(a), Some(i)) => (a - i).abs(),
        (Some(a), None) => a,
        (None, Some(i)) => i,
        (None, None) => 0.0,
    };
    let max = config.max_level() as f64;
    let step = (config.increment_slope * score * max).ceil() as i64;
    (step, config.max_level() as i64)
}

/// Apply the computed level.
pub fn commit(values: &mut [usize], id: ElementId, state: &ElementState) {
    values[id] = state.next_value;
}
