//! Per-scenario initial values and scripted toggles.

use serde::Serialize;

use crate::error::{LevelNetError, Result};

/// Starting level directive for one element in one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialValue {
    Level(usize),
    /// Drawn uniformly from `0..levels`
    Random,
    /// Declared but unsupported; starts at level 0
    Knockout,
}

/// Scripted override applied after the scheduled update of `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Toggle {
    pub step: usize,
    pub level: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioInit {
    pub initial: InitialValue,
    pub toggles: Vec<Toggle>,
}

impl ScenarioInit {
    /// Parse `<initial>[,<level>[<step>]]*`.
    pub fn parse(cell: &str, levels: usize, element: &str, scenario: usize) -> Result<Self> {
        let invalid = || LevelNetError::InvalidInitialValue {
            element: element.to_string(),
            scenario,
            value: cell.to_string(),
        };

        let mut parts = cell.split(',');
        let head = parts.next().unwrap_or("").trim();

        let mut toggles = Vec::new();
        for part in parts {
            let part = part.trim();
            let (level, rest) = part.split_once('[').ok_or_else(invalid)?;
            let step = rest.strip_suffix(']').ok_or_else(invalid)?;
            let level: usize = level.trim().parse().map_err(|_| invalid())?;
            let step: usize = step.trim().parse().map_err(|_| invalid())?;
            if level >= levels {
                return Err(invalid());
            }
            toggles.push(Toggle { step, level });
        }

        let initial = match head.to_lowercase().as_str() {
            "" => {
                return Err(LevelNetError::MissingInitialValue {
                    element: element.to_string(),
                    scenario,
                })
            }
            "r" | "random" => InitialValue::Random,
            "l" | "low" => InitialValue::Level(0),
            "m" | "med" | "medium" | "middle" | "moderate" => InitialValue::Level(levels / 2),
            "h" | "high" => InitialValue::Level(levels - 1),
            "x" => InitialValue::Knockout,
            other => {
                let level: usize = other.parse().map_err(|_| invalid())?;
                if level >= levels {
                    return Err(invalid());
                }
                InitialValue::Level(level)
            }
        };

        Ok(Self { initial, toggles })
    }

    /// Level used before any randomization.
    pub fn base_level(&self) -> usize {
        match self.initial {
            InitialValue::Level(level) => level,
            InitialValue::Random | InitialValue::Knockout => 0,
        }
    }
}
