//! Immutable per-element configuration, built once from a [`ModelTable`].
//!
//! Construction runs in two passes: the first fixes element names, ids and
//! level counts; the second parses every remaining cell with regulator names
//! resolved against the first pass. Any validation failure aborts the build.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use super::scenario::{InitialValue, ScenarioInit};
use super::table::{cell, ColumnLayout, ModelTable};
use super::ElementId;
use crate::config::ModelDefaults;
use crate::error::{LevelNetError, Result};
use crate::regulation::{Expression, TableMode, TruthTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

/// Tie-break policy applied when activator and inhibitor scores are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Balancing {
    pub direction: Direction,
    pub delay: u32,
}

impl Balancing {
    /// Parse a balancing cell. `None` means balancing is disabled.
    pub fn parse(element: &str, spec: &str) -> Result<Option<Self>> {
        let invalid = || LevelNetError::InvalidBalancing {
            element: element.to_string(),
            spec: spec.to_string(),
        };
        let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
        if matches!(parts[0], "-" | "none" | "None") {
            return Ok(None);
        }
        if parts.len() != 2 {
            return Err(invalid());
        }
        let direction = match parts[0] {
            "increase" | "positive" => Direction::Increase,
            "decrease" | "negative" => Direction::Decrease,
            _ => return Err(invalid()),
        };
        let delay = parts[1].parse().map_err(|_| invalid())?;
        Ok(Some(Self { direction, delay }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationRole {
    Input,
    Output,
}

/// Steady-state optimization annotations, consumed by external analysis only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Optimization {
    pub role: Option<OptimizationRole>,
    pub fixed_value: Option<String>,
    pub objective_weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegulationKind {
    Expression {
        activators: Option<Expression>,
        inhibitors: Option<Expression>,
    },
    Table(TruthTable),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementConfig {
    pub name: String,
    pub regulation: RegulationKind,
    pub levels: usize,
    /// `2*(levels-1)` entries: rising edges `0→1..`, then falling edges top down
    pub delays: Vec<u32>,
    pub noise: u32,
    pub delta: u32,
    pub balancing: Option<Balancing>,
    pub spontaneous: Option<u32>,
    /// 0 means a fixed step of one level
    pub increment_slope: f64,
    pub group: Option<String>,
    /// Declared update rate; absent rates weigh 1
    pub rate: Option<u32>,
    pub rank: i64,
    pub probability: f64,
    pub optimization: Optimization,
    /// One entry per scenario column
    pub scenarios: Vec<ScenarioInit>,
}

impl ElementConfig {
    /// True when the element has any activator, inhibitor or table regulation.
    pub fn is_regulated(&self) -> bool {
        match &self.regulation {
            RegulationKind::Expression {
                activators,
                inhibitors,
            } => activators.is_some() || inhibitors.is_some(),
            RegulationKind::Table(_) => true,
        }
    }

    /// Regulator ids in order of first appearance.
    pub fn regulators(&self) -> Vec<ElementId> {
        match &self.regulation {
            RegulationKind::Expression {
                activators,
                inhibitors,
            } => {
                let mut ids = Vec::new();
                for id in activators
                    .iter()
                    .chain(inhibitors.iter())
                    .flat_map(Expression::regulators)
                {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ids
            }
            RegulationKind::Table(table) => table.regulators().to_vec(),
        }
    }

    pub fn max_level(&self) -> usize {
        self.levels - 1
    }

    /// Longest delay any transition, spontaneous or balancing rule waits for.
    pub fn max_delay(&self) -> u32 {
        self.delays
            .iter()
            .copied()
            .chain(self.spontaneous)
            .chain(self.balancing.map(|b| b.delay))
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    elements: Vec<ElementConfig>,
    index: HashMap<String, ElementId>,
    levels: Vec<usize>,
    update_list: Vec<ElementId>,
    sorted: Vec<ElementId>,
    scenario_count: usize,
}

impl Registry {
    pub fn build(table: &ModelTable, defaults: &ModelDefaults) -> Result<Self> {
        let layout = ColumnLayout::discover(&table.headers)?;
        let rows: Vec<&Vec<String>> = table
            .rows
            .iter()
            .filter(|row| !cell(row, Some(layout.variable)).is_empty())
            .collect();

        // Pass 1: names, ids and level counts
        let mut index = HashMap::with_capacity(rows.len());
        let mut names = Vec::with_capacity(rows.len());
        let mut levels = Vec::with_capacity(rows.len());
        for row in &rows {
            let name = cell(row, Some(layout.variable));
            if !valid_name(name) {
                return Err(LevelNetError::InvalidElementName(name.to_string()));
            }
            if index.insert(name.to_string(), names.len()).is_some() {
                return Err(LevelNetError::DuplicateElement(name.to_string()));
            }
            names.push(name.to_string());
            levels.push(parse_or(name, "levels", cell(row, layout.levels), defaults.levels)?);
            if levels[levels.len() - 1] < 2 {
                return Err(LevelNetError::InvalidField {
                    element: name.to_string(),
                    field: "levels",
                    value: cell(row, layout.levels).to_string(),
                });
            }
        }

        let resolve = |name: &str| index.get(name).copied();

        // Pass 2: everything else
        let mut elements = Vec::with_capacity(rows.len());
        for (id, row) in rows.iter().enumerate() {
            let name = names[id].as_str();
            let element_levels = levels[id];

            let activator_text = cell(row, Some(layout.positive));
            let inhibitor_text = cell(row, Some(layout.negative));
            let regulation = match table.truth_table_for(name) {
                Some(sheet) if activator_text.is_empty() && inhibitor_text.is_empty() => {
                    RegulationKind::Table(TruthTable::build(
                        sheet,
                        element_levels,
                        &levels,
                        &resolve,
                    )?)
                }
                _ => RegulationKind::Expression {
                    activators: Expression::parse(name, activator_text, &resolve)?,
                    inhibitors: Expression::parse(name, inhibitor_text, &resolve)?,
                },
            };

            let delays = parse_delays(name, cell(row, layout.delays), element_levels)?;

            let balancing_cell = cell(row, layout.balancing);
            let balancing = if balancing_cell.is_empty() {
                Balancing::parse(name, &defaults.balancing)?
            } else {
                Balancing::parse(name, balancing_cell)?
            };

            let spontaneous = match cell(row, layout.spontaneous) {
                "" => Some(defaults.spontaneous),
                "-" | "none" | "None" => None,
                other => Some(parse_or(name, "spontaneous", other, 0)?),
            };

            let scenarios = layout
                .scenarios
                .iter()
                .enumerate()
                .map(|(s, &column)| {
                    ScenarioInit::parse(cell(row, Some(column)), element_levels, name, s)
                })
                .collect::<Result<Vec<_>>>()?;

            let mut config = ElementConfig {
                name: name.to_string(),
                regulation,
                levels: element_levels,
                delays,
                noise: parse_or(name, "noise", cell(row, layout.noise), defaults.noise)?,
                delta: parse_or(name, "delta", cell(row, layout.delta), defaults.delta)?,
                balancing,
                spontaneous,
                increment_slope: parse_or(
                    name,
                    "increment",
                    cell(row, layout.increment),
                    defaults.increment,
                )?,
                group: None,
                rate: None,
                rank: defaults.update_rank,
                probability: defaults.update_probability,
                optimization: parse_optimization(name, row, &layout)?,
                scenarios,
            };

            let group = cell(row, layout.update_group);
            let rate = cell(row, layout.update_rate);
            let rank = cell(row, layout.update_rank);
            let probability = cell(row, layout.update_probability);
            if config.is_regulated() {
                if !group.is_empty() {
                    config.group = Some(group.to_string());
                }
                if !rate.is_empty() {
                    config.rate = Some(parse_or(name, "update rate", rate, 1)?);
                }
                config.rank = parse_or(name, "update rank", rank, defaults.update_rank)?;
                config.probability = parse_or(
                    name,
                    "update probability",
                    probability,
                    defaults.update_probability,
                )?;
                if !(0.0..=1.0).contains(&config.probability) {
                    return Err(LevelNetError::InvalidField {
                        element: name.to_string(),
                        field: "update probability",
                        value: probability.to_string(),
                    });
                }
            } else if [group, rate, rank, probability].iter().any(|c| !c.is_empty()) {
                warn!(element = name, "update settings ignored on unregulated element");
            }

            elements.push(config);
        }

        let update_list = elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_regulated())
            .map(|(id, _)| id)
            .collect();

        let mut sorted: Vec<ElementId> = (0..elements.len()).collect();
        sorted.sort_by(|&a, &b| elements[a].name.cmp(&elements[b].name));

        debug!(
            elements = elements.len(),
            scenarios = layout.scenarios.len(),
            "registry built"
        );

        Ok(Self {
            elements,
            index,
            levels,
            update_list,
            sorted,
            scenario_count: layout.scenarios.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, id: ElementId) -> &ElementConfig {
        &self.elements[id]
    }

    pub fn elements(&self) -> &[ElementConfig] {
        &self.elements
    }

    /// Level count per element, indexed by id.
    pub fn levels(&self) -> &[usize] {
        &self.levels
    }

    pub fn id_of(&self, name: &str) -> Option<ElementId> {
        self.index.get(name).copied()
    }

    /// Elements the scheduler may update, in table order.
    pub fn update_list(&self) -> &[ElementId] {
        &self.update_list
    }

    /// All element ids in alphabetical order of name.
    pub fn sorted_ids(&self) -> &[ElementId] {
        &self.sorted
    }

    pub fn scenario_count(&self) -> usize {
        self.scenario_count
    }

    /// Whether any element declares an update rate.
    pub fn rate_weighted(&self) -> bool {
        self.update_list
            .iter()
            .any(|&id| self.elements[id].rate.is_some())
    }

    /// Members of `id`'s update group (including `id`), or just `id`.
    pub fn group_members(&self, id: ElementId) -> Vec<ElementId> {
        match &self.elements[id].group {
            Some(group) => self
                .update_list
                .iter()
                .copied()
                .filter(|&other| self.elements[other].group.as_ref() == Some(group))
                .collect(),
            None => vec![id],
        }
    }

    pub fn knockouts(&self, scenario: usize) -> Vec<ElementId> {
        self.with_initial(scenario, InitialValue::Knockout)
    }

    pub fn random_initials(&self, scenario: usize) -> Vec<ElementId> {
        self.with_initial(scenario, InitialValue::Random)
    }

    fn with_initial(&self, scenario: usize, wanted: InitialValue) -> Vec<ElementId> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.scenarios.get(scenario).map(|s| s.initial) == Some(wanted))
            .map(|(id, _)| id)
            .collect()
    }

    pub fn summary(&self) -> RegistrySummary {
        let elements = self
            .elements
            .iter()
            .map(|e| {
                let (kind, activators, inhibitors, table_mode) = match &e.regulation {
                    RegulationKind::Expression {
                        activators,
                        inhibitors,
                    } => (
                        "expression",
                        activators.as_ref().map(|x| x.source().to_string()),
                        inhibitors.as_ref().map(|x| x.source().to_string()),
                        None,
                    ),
                    RegulationKind::Table(t) => ("table", None, None, Some(t.mode())),
                };
                ElementSummary {
                    name: e.name.clone(),
                    regulation: kind,
                    activators,
                    inhibitors,
                    table_mode,
                    regulators: e
                        .regulators()
                        .into_iter()
                        .map(|id| self.elements[id].name.clone())
                        .collect(),
                    levels: e.levels,
                    delays: e.delays.clone(),
                    noise: e.noise,
                    delta: e.delta,
                    balancing: e.balancing,
                    spontaneous: e.spontaneous,
                    increment_slope: e.increment_slope,
                    group: e.group.clone(),
                    rate: e.rate,
                    rank: e.rank,
                    probability: e.probability,
                    optimization: e.optimization.clone(),
                    scenarios: e.scenarios.clone(),
                }
            })
            .collect();
        RegistrySummary {
            scenarios: self.scenario_count,
            update_list: self
                .update_list
                .iter()
                .map(|&id| self.elements[id].name.clone())
                .collect(),
            elements,
        }
    }
}

/// Serializable view of the registry for external analysis tooling.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySummary {
    pub scenarios: usize,
    pub update_list: Vec<String>,
    pub elements: Vec<ElementSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElementSummary {
    pub name: String,
    pub regulation: &'static str,
    pub activators: Option<String>,
    pub inhibitors: Option<String>,
    pub table_mode: Option<TableMode>,
    pub regulators: Vec<String>,
    pub levels: usize,
    pub delays: Vec<u32>,
    pub noise: u32,
    pub delta: u32,
    pub balancing: Option<Balancing>,
    pub spontaneous: Option<u32>,
    pub increment_slope: f64,
    pub group: Option<String>,
    pub rate: Option<u32>,
    pub rank: i64,
    pub probability: f64,
    pub optimization: Optimization,
    pub scenarios: Vec<ScenarioInit>,
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_or<T: std::str::FromStr>(
    element: &str,
    field: &'static str,
    text: &str,
    default: T,
) -> Result<T> {
    if text.is_empty() {
        return Ok(default);
    }
    text.parse().map_err(|_| LevelNetError::InvalidField {
        element: element.to_string(),
        field,
        value: text.to_string(),
    })
}

fn parse_delays(element: &str, text: &str, levels: usize) -> Result<Vec<u32>> {
    let expected = 2 * (levels - 1);
    if text.is_empty() {
        return Ok(vec![0; expected]);
    }
    let delays = text
        .split(',')
        .map(|d| parse_or(element, "delays", d.trim(), 0))
        .collect::<Result<Vec<u32>>>()?;
    match delays.len() {
        1 => Ok(vec![delays[0]; expected]),
        n if n == expected => Ok(delays),
        found => Err(LevelNetError::InvalidDelays {
            element: element.to_string(),
            expected,
            found,
        }),
    }
}

fn parse_optimization(element: &str, row: &[String], layout: &ColumnLayout) -> Result<Optimization> {
    let role = match cell(row, layout.optimization_input) {
        "I" | "i" | "Input" | "input" => Some(OptimizationRole::Input),
        "O" | "o" | "Output" | "output" => Some(OptimizationRole::Output),
        "" => None,
        other => {
            warn!(element, value = other, "unrecognized optimization role ignored");
            None
        }
    };
    let fixed = cell(row, layout.optimization_fixed);
    let fixed_value = (role.is_some() && !fixed.is_empty()).then(|| fixed.to_string());
    let weight = cell(row, layout.optimization_objective);
    let objective_weight = if weight.is_empty() {
        None
    } else {
        Some(parse_or(element, "optimization objective", weight, 0.0)?)
    };
    Ok(Optimization {
        role,
        fixed_value,
        objective_weight,
    })
}
