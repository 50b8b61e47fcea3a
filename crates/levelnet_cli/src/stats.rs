use std::path::Path;

use anyhow::{Context, Result};
use levelnet_core::SimulationSummary;
use tracing::info;

/// Write per-element, per-step mean and standard deviation as CSV rows
/// `element,step,mean,std_dev`.
pub fn export_csv(summary: &SimulationSummary, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record(["element", "step", "mean", "std_dev"])?;
    for stats in &summary.elements {
        for (step, (mean, std_dev)) in stats.mean.iter().zip(&stats.std_dev).enumerate() {
            writer.write_record([
                stats.name.clone(),
                step.to_string(),
                format!("{mean:.6}"),
                format!("{std_dev:.6}"),
            ])?;
        }
    }
    writer.flush()?;
    info!(path = %path.display(), elements = summary.elements.len(), "statistics exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use levelnet_core::ElementStats;
    use std::fs;

    #[test]
    fn test_rows_per_element_and_step() {
        let summary = SimulationSummary {
            runs: 2,
            steps: 1,
            normalized: false,
            elements: vec![
                ElementStats {
                    name: "A".to_string(),
                    levels: 3,
                    mean: vec![1.0, 1.5],
                    std_dev: vec![0.0, 0.5],
                },
                ElementStats {
                    name: "B".to_string(),
                    levels: 2,
                    mean: vec![0.0, 1.0],
                    std_dev: vec![0.0, 0.0],
                },
            ],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.csv");
        export_csv(&summary, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "element,step,mean,std_dev");
        assert_eq!(lines[2], "A,1,1.500000,0.500000");
        assert_eq!(lines[4], "B,1,1.000000,0.000000");
    }
}
