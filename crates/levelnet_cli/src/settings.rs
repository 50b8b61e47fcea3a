use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use levelnet_core::ModelDefaults;
use tracing::info;

/// Load model defaults from a TOML file; any key left out keeps its default.
///
/// ```toml
/// levels = 3
/// noise = 0
/// balancing = "increase,2"
/// ```
pub fn load_defaults(path: Option<&Path>) -> Result<ModelDefaults> {
    let Some(path) = path else {
        return Ok(ModelDefaults::default());
    };
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let defaults: ModelDefaults =
        toml::from_str(&content).with_context(|| format!("invalid defaults in {}", path.display()))?;
    info!(path = %path.display(), ?defaults, "model defaults loaded");
    Ok(defaults)
}
