use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use csv::Writer;
use log::info;
use serde::{Deserialize, Serialize};

use crate::chain::BestFit;
use crate::error::{BlazarError, Result};

/// Best fit and one-sigma spread of every free parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub param_names: Vec<String>,
    pub best_log_prob: f64,
    pub best_chi_squared: f64,
    pub best_params: Vec<f64>,
    /// `best - min` over the one-sigma samples.
    pub sigma_below: Vec<f64>,
    /// `max - best` over the one-sigma samples.
    pub sigma_above: Vec<f64>,
    pub n_samples: usize,
    pub n_within_1sigma: usize,
}

impl Summary {
    pub fn new(
        param_names: Vec<String>,
        best: &BestFit,
        sigma_min: &[f64],
        sigma_max: &[f64],
        n_samples: usize,
        n_within_1sigma: usize,
    ) -> Result<Self> {
        let dims = best.params.len();
        for len in [param_names.len(), sigma_min.len(), sigma_max.len()] {
            if len != dims {
                return Err(BlazarError::DimensionMismatch { expected: dims, found: len });
            }
        }
        Ok(Summary {
            param_names,
            best_log_prob: best.log_prob,
            best_chi_squared: best.chi_squared(),
            best_params: best.params.clone(),
            sigma_below: best.params.iter().zip(sigma_min).map(|(b, lo)| b - lo).collect(),
            sigma_above: best.params.iter().zip(sigma_max).map(|(b, hi)| hi - b).collect(),
            n_samples,
            n_within_1sigma,
        })
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| BlazarError::io(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        info!("✓ wrote {}", path.display());
        Ok(())
    }

    /// `param,best,sigma_below,sigma_above`, one row per parameter.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = Writer::from_path(path).map_err(|e| BlazarError::csv(path, e))?;
        writer
            .write_record(["param", "best", "sigma_below", "sigma_above"])
            .map_err(|e| BlazarError::csv(path, e))?;
        for (i, name) in self.param_names.iter().enumerate() {
            writer
                .write_record([
                    name.clone(),
                    self.best_params[i].to_string(),
                    self.sigma_below[i].to_string(),
                    self.sigma_above[i].to_string(),
                ])
                .map_err(|e| BlazarError::csv(path, e))?;
        }
        writer.flush().map_err(|e| BlazarError::io(path, e))?;
        info!("✓ wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> Summary {
        let best = BestFit {
            index: 3,
            log_prob: -4.5,
            params: vec![1.0, 10.0],
        };
        Summary::new(vec!["a".into(), "b".into()], &best, &[0.5, 9.0], &[1.25, 12.0], 100, 40).unwrap()
    }

    #[test]
    fn spreads_are_distances_from_best() {
        let s = summary();
        assert_eq!(s.best_chi_squared, 9.0);
        assert_eq!(s.sigma_below, vec![0.5, 1.0]);
        assert_eq!(s.sigma_above, vec![0.25, 2.0]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let best = BestFit {
            index: 0,
            log_prob: -1.0,
            params: vec![1.0],
        };
        assert!(Summary::new(vec!["a".into()], &best, &[0.0, 0.0], &[2.0], 1, 1).is_err());
    }

    #[test]
    fn writes_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let s = summary();
        let json = dir.path().join("summary.json");
        let csv_path = dir.path().join("best_params.csv");
        s.write_json(&json).unwrap();
        s.write_csv(&csv_path).unwrap();

        let back: Summary = serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(back, s);
        let table = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = table.lines();
        assert_eq!(lines.next(), Some("param,best,sigma_below,sigma_above"));
        assert_eq!(lines.next(), Some("a,1,0.5,0.25"));
    }
}
