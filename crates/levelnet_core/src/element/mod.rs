//! Per-element runtime state and the delayed transition rule.

pub mod state;
pub mod transition;

pub use state::{ElementState, Marker, ScoreHistory};
pub use transition::{commit, compute_next, down_index, up_index};
