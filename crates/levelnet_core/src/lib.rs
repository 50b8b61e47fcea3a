//! Discrete multi-level influence network simulator.
//!
//! Elements take one of a few ordered levels and move up or down according to
//! activator/inhibitor expressions or truth tables, subject to transition
//! delays, noise tolerance, balancing and spontaneous drift. A [`Registry`]
//! is built once from a [`ModelTable`]; [`run_simulation`] then repeats the
//! model under one of eight update disciplines and writes a trace file.
//!
//! ```no_run
//! use levelnet_core::{run_simulation, ModelDefaults, ModelTable, Registry, SimulationConfig};
//!
//! # fn main() -> levelnet_core::Result<()> {
//! let mut table = ModelTable::new(
//!     ["Variable", "Positive", "Negative", "Initial"].map(String::from).to_vec(),
//! );
//! table.push_row(["A", "B", "", "0"]);
//! table.push_row(["B", "", "", "1"]);
//! let registry = Registry::build(&table, &ModelDefaults::default())?;
//! let summary = run_simulation(&registry, &SimulationConfig::default())?;
//! println!("{} runs", summary.runs);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod element;
pub mod error;
pub mod model;
pub mod regulation;
pub mod scheduler;
pub mod simulation;

pub use config::{DelayJitter, Discipline, ModelDefaults, OutputMode, SimulationConfig};
pub use error::{LevelNetError, Result};
pub use model::{ElementConfig, ElementId, ModelTable, Registry, RegistrySummary, TruthTableSheet};
pub use scheduler::{RunState, Scheduler};
pub use simulation::{run_simulation, ElementStats, EventTrace, SimulationContext, SimulationSummary};
