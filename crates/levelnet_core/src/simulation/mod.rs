//! Repeated runs, scripted toggles, cross-run aggregation and trace output.

pub mod aggregate;
pub mod event_trace;
pub mod trace;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

pub use aggregate::{Aggregate, ElementStats, SimulationSummary};
pub use event_trace::EventTrace;
pub use trace::TraceWriter;

use crate::config::{Discipline, OutputMode, SimulationConfig};
use crate::error::{LevelNetError, Result};
use crate::model::{ElementId, Registry};
use crate::scheduler::{RunState, Scheduler};

/// Everything a run needs that does not change between runs.
pub struct SimulationContext<'a> {
    registry: &'a Registry,
    scheduler: Scheduler,
    scenario: usize,
    seed: u64,
    /// Re-draw "random" initial values at the start of each run
    redraw_random: bool,
    random_initials: Vec<ElementId>,
    /// Scenario starting levels, with "random" elements drawn once
    base_initial: Vec<usize>,
}

impl<'a> SimulationContext<'a> {
    pub fn new(registry: &'a Registry, config: &SimulationConfig, seed: u64) -> Result<Self> {
        let scenario = config.scenario;
        if scenario >= registry.scenario_count() {
            return Err(LevelNetError::UnknownScenario {
                scenario,
                available: registry.scenario_count(),
            });
        }
        if let Some(&id) = registry.knockouts(scenario).first() {
            return Err(LevelNetError::KnockoutUnsupported(
                registry.element(id).name.clone(),
            ));
        }

        let random_initials = registry.random_initials(scenario);
        let mut base_initial: Vec<usize> = registry
            .elements()
            .iter()
            .map(|e| e.scenarios[scenario].base_level())
            .collect();
        let mut rng = Self::stream(seed, 0);
        for &id in &random_initials {
            base_initial[id] = rng.gen_range(0..registry.levels()[id]);
        }

        Ok(Self {
            registry,
            scheduler: Scheduler::new(registry, config.discipline)?,
            scenario,
            seed,
            redraw_random: config.discipline.is_synchronous() || config.randomize_each_run,
            random_initials,
            base_initial,
        })
    }

    /// Independent ChaCha stream; stream 0 is reserved for the initial draw.
    fn stream(seed: u64, stream: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(stream);
        rng
    }

    /// Simulate run number `run` for `steps` steps, accumulating into `aggregate`.
    ///
    /// `schedule` supplies the element for each step under `fixed_updates`.
    /// Returns the final run state and the element selected at each step.
    pub fn run(
        &self,
        run: usize,
        steps: usize,
        schedule: Option<&[ElementId]>,
        normalize: bool,
        aggregate: &mut Aggregate,
    ) -> Result<(RunState, Vec<ElementId>)> {
        let registry = self.registry;
        let mut rng = Self::stream(self.seed, run as u64 + 1);

        let mut initial = self.base_initial.clone();
        if self.redraw_random {
            for &id in &self.random_initials {
                initial[id] = rng.gen_range(0..registry.levels()[id]);
            }
        }

        let scaled = |id: ElementId, level: usize| -> f64 {
            if normalize {
                level as f64 / (registry.levels()[id] - 1) as f64
            } else {
                level as f64
            }
        };

        let mut state = RunState::new(registry, initial);
        for (id, &level) in state.values.iter().enumerate() {
            aggregate.add(id, 0, scaled(id, level));
        }

        let mut selected = Vec::with_capacity(steps);
        for step in 1..=steps {
            let fixed = schedule.map(|s| s[step - 1]);
            if let Some(id) = self.scheduler.step(registry, &mut state, step, fixed, &mut rng)? {
                selected.push(id);
            }
            state.record();

            for id in 0..registry.len() {
                aggregate.add(id, step, scaled(id, state.values[id]));
                for toggle in &registry.element(id).scenarios[self.scenario].toggles {
                    if toggle.step == step {
                        state.values[id] = toggle.level;
                        state.history[id][step] = toggle.level;
                        aggregate.overwrite(id, step, scaled(id, toggle.level));
                    }
                }
            }
        }

        debug!(run, steps, "run complete");
        Ok((state, selected))
    }
}

/// Simulate `config.runs` runs of the model and write the trace file.
pub fn run_simulation(registry: &Registry, config: &SimulationConfig) -> Result<SimulationSummary> {
    if config.output_mode == OutputMode::EventTrace && !config.discipline.selects_single() {
        return Err(LevelNetError::UnsupportedOutputMode {
            mode: config.output_mode,
            discipline: config.discipline,
        });
    }

    let trace = match (config.discipline, &config.event_traces) {
        (Discipline::FixedUpdates, Some(path)) => Some(EventTrace::read(path, registry)?),
        (Discipline::FixedUpdates, None) => {
            return Err(LevelNetError::EventTrace(
                "fixed_updates requires an event-trace file".to_string(),
            ))
        }
        _ => None,
    };
    let (runs, steps) = match &trace {
        Some(trace) => (trace.runs(), trace.reconcile_steps(config.steps)?),
        None => (config.runs, config.steps),
    };

    let seed = config.seed.unwrap_or_else(rand::random);
    let context = SimulationContext::new(registry, config, seed)?;

    info!(
        discipline = ?config.discipline,
        runs,
        steps,
        seed,
        scenario = config.scenario,
        output = %config.output.display(),
        "starting simulation"
    );

    let mut writer = TraceWriter::create(&config.output, registry, config.output_mode, config.normalize)?;
    let mut aggregate = Aggregate::new(registry.len(), steps, runs);
    for run in 0..runs {
        let schedule = trace.as_ref().map(|t| t.schedule(run));
        let (state, selected) = context.run(run, steps, schedule, config.normalize, &mut aggregate)?;
        writer.write_run(run, &state, steps, &selected)?;
    }
    writer.write_summary(&aggregate)?;
    let path = writer.finish()?;

    info!(path = %path.display(), runs, steps, "simulation complete");
    Ok(aggregate.summarize(registry, config.normalize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelDefaults;
    use crate::model::ModelTable;

    fn registry(rows: &[[&str; 4]]) -> Registry {
        let mut table = ModelTable::new(
            ["Variable", "Positive", "Negative", "Initial"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        for row in rows {
            table.push_row(row.iter().copied());
        }
        Registry::build(&table, &ModelDefaults::default()).unwrap()
    }

    #[test]
    fn test_knockout_is_rejected() {
        let registry = registry(&[["A", "", "", "x"]]);
        let err = SimulationContext::new(&registry, &SimulationConfig::default(), 1);
        assert!(matches!(err, Err(LevelNetError::KnockoutUnsupported(_))));
    }

    #[test]
    fn test_unknown_scenario() {
        let registry = registry(&[["A", "", "", "0"]]);
        let config = SimulationConfig {
            scenario: 3,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            SimulationContext::new(&registry, &config, 1),
            Err(LevelNetError::UnknownScenario { scenario: 3, available: 1 })
        ));
    }

    #[test]
    fn test_toggle_overrides_value_and_aggregate() {
        let registry = registry(&[["A", "", "", "0,2[2]"]]);
        let context = SimulationContext::new(&registry, &SimulationConfig::default(), 9).unwrap();
        let mut agg = Aggregate::new(1, 3, 2);
        for run in 0..2 {
            let (state, _) = context.run(run, 3, None, false, &mut agg).unwrap();
            assert_eq!(state.history[0], vec![0, 0, 2, 2]);
        }
        assert_eq!(agg.sums(0), &[0.0, 0.0, 4.0, 4.0]);
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let registry = registry(&[["A", "B", "", "r"], ["B", "!A", "", "r"]]);
        let context = SimulationContext::new(&registry, &SimulationConfig::default(), 42).unwrap();
        let mut agg = Aggregate::new(2, 20, 1);
        let (first, picks_a) = context.run(0, 20, None, false, &mut agg).unwrap();
        let (second, picks_b) = context.run(0, 20, None, false, &mut agg).unwrap();
        assert_eq!(first.history, second.history);
        assert_eq!(picks_a, picks_b);
        assert_eq!(picks_a.len(), 20);
    }

    #[test]
    fn test_event_trace_mode_requires_single_selection() {
        let registry = registry(&[["A", "", "", "0"]]);
        let config = SimulationConfig {
            discipline: Discipline::Sync,
            output_mode: OutputMode::EventTrace,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            run_simulation(&registry, &config),
            Err(LevelNetError::UnsupportedOutputMode { .. })
        ));
    }
}
