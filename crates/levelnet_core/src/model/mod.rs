pub mod registry;
pub mod scenario;
pub mod table;

pub use registry::{
    Balancing, Direction, ElementConfig, ElementSummary, OptimizationRole, Optimization, Registry,
    RegistrySummary, RegulationKind,
};
pub use scenario::{InitialValue, ScenarioInit, Toggle};
pub use table::{ColumnLayout, ModelTable, TruthTableSheet};

/// Dense index of an element, assigned in model-table row order.
pub type ElementId = usize;
