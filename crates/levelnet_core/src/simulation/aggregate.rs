use serde::Serialize;

use crate::model::{ElementId, Registry};

/// Running per-element, per-step sums across runs.
#[derive(Debug, Clone)]
pub struct Aggregate {
    runs: usize,
    sums: Vec<Vec<f64>>,
    squares: Vec<Vec<f64>>,
}

impl Aggregate {
    /// Accumulators for steps `0..=steps`.
    pub fn new(elements: usize, steps: usize, runs: usize) -> Self {
        Self {
            runs,
            sums: vec![vec![0.0; steps + 1]; elements],
            squares: vec![vec![0.0; steps + 1]; elements],
        }
    }

    pub fn runs(&self) -> usize {
        self.runs
    }

    pub fn add(&mut self, id: ElementId, step: usize, value: f64) {
        self.sums[id][step] += value;
        self.squares[id][step] += value * value;
    }

    /// Pin a step to `value` in every run, as a scripted toggle does.
    pub fn overwrite(&mut self, id: ElementId, step: usize, value: f64) {
        let runs = self.runs as f64;
        self.sums[id][step] = value * runs;
        self.squares[id][step] = value * value * runs;
    }

    pub fn sums(&self, id: ElementId) -> &[f64] {
        &self.sums[id]
    }

    pub fn squares(&self, id: ElementId) -> &[f64] {
        &self.squares[id]
    }

    pub fn mean(&self, id: ElementId, step: usize) -> f64 {
        if self.runs == 0 {
            return 0.0;
        }
        self.sums[id][step] / self.runs as f64
    }

    /// Population standard deviation.
    pub fn std_dev(&self, id: ElementId, step: usize) -> f64 {
        if self.runs == 0 {
            return 0.0;
        }
        let mean = self.mean(id, step);
        let variance = self.squares[id][step] / self.runs as f64 - mean * mean;
        variance.max(0.0).sqrt()
    }

    pub fn summarize(&self, registry: &Registry, normalized: bool) -> SimulationSummary {
        let elements = registry
            .sorted_ids()
            .iter()
            .map(|&id| {
                let steps = self.sums[id].len();
                ElementStats {
                    name: registry.element(id).name.clone(),
                    levels: registry.element(id).levels,
                    mean: (0..steps).map(|s| self.mean(id, s)).collect(),
                    std_dev: (0..steps).map(|s| self.std_dev(id, s)).collect(),
                }
            })
            .collect();
        SimulationSummary {
            runs: self.runs,
            steps: self.sums.first().map_or(0, |s| s.len().saturating_sub(1)),
            normalized,
            elements,
        }
    }
}

/// Cross-run statistics returned by a simulation.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub runs: usize,
    pub steps: usize,
    /// Whether means are over normalized levels
    pub normalized: bool,
    /// Alphabetical by element name
    pub elements: Vec<ElementStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElementStats {
    pub name: String,
    pub levels: usize,
    /// Indexed by step, step 0 is the initial value
    pub mean: Vec<f64>,
    pub std_dev: Vec<f64>,
}

impl SimulationSummary {
    pub fn element(&self, name: &str) -> Option<&ElementStats> {
        self.elements.iter().find(|e| e.name == name)
    }
}
