//! Error type shared by registry construction and simulation runs.
//!
//! Configuration errors are raised while building the [`Registry`](crate::model::Registry)
//! and abort construction before any run starts. Runtime errors are raised from
//! inside a simulation and abort the whole operation; nothing is retried.

use thiserror::Error;

/// Crate result type
pub type Result<T> = std::result::Result<T, LevelNetError>;

#[derive(Debug, Error)]
pub enum LevelNetError {
    // --- configuration errors ---
    #[error("missing required column(s): {0}")]
    MissingColumn(String),

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("invalid characters in element name '{0}': use only letters, numbers, and underscores")]
    InvalidElementName(String),

    #[error("duplicate element name: {0}")]
    DuplicateElement(String),

    #[error("element {element} references unknown regulator '{regulator}'")]
    UnknownRegulator { element: String, regulator: String },

    #[error(
        "element {element}: expected {expected} delays (2 * (levels - 1)) or a single value, found {found}"
    )]
    InvalidDelays {
        element: String,
        expected: usize,
        found: usize,
    },

    #[error(
        "element {element}: balancing must be [increase|decrease],[delay] or None, found '{spec}'"
    )]
    InvalidBalancing { element: String, spec: String },

    #[error("element {element}: missing initial value for scenario {scenario}")]
    MissingInitialValue { element: String, scenario: usize },

    #[error("element {element}: invalid initial value '{value}' for scenario {scenario}")]
    InvalidInitialValue {
        element: String,
        scenario: usize,
        value: String,
    },

    #[error("element {element}: invalid {field} '{value}'")]
    InvalidField {
        element: String,
        field: &'static str,
        value: String,
    },

    #[error("truth table for {element}: {reason}")]
    InvalidTruthTable { element: String, reason: String },

    #[error("element {element}: malformed regulation expression '{expression}': {reason}")]
    MalformedExpression {
        element: String,
        expression: String,
        reason: String,
    },

    // --- runtime errors ---
    #[error("truth table for {element}: index {index:?} is out of range")]
    TableIndexOutOfRange { element: String, index: Vec<usize> },

    #[error("knockout is not supported (element {0})")]
    KnockoutUnsupported(String),

    #[error("scenario {scenario} does not exist in model ({available} scenario column(s), zero-indexed)")]
    UnknownScenario { scenario: usize, available: usize },

    #[error("event trace: {0}")]
    EventTrace(String),

    #[error("output mode {mode:?} is not available for discipline {discipline:?}")]
    UnsupportedOutputMode {
        mode: crate::config::OutputMode,
        discipline: crate::config::Discipline,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LevelNetError {
    /// True for errors detected while building the registry.
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            LevelNetError::TableIndexOutOfRange { .. }
                | LevelNetError::KnockoutUnsupported(_)
                | LevelNetError::UnknownScenario { .. }
                | LevelNetError::EventTrace(_)
                | LevelNetError::UnsupportedOutputMode { .. }
                | LevelNetError::Io(_)
        )
    }
}
