//! Running the external emission-model executable and reading its output.
//!
//! The executable writes one `.dat` file per emission component into its
//! working directory, named `<stem>_<suffix>.dat`. Column 0 holds log10 ν
//! and column 2 log10 νFν.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};

use crate::config::ModelConfig;
use crate::error::{BlazarError, Result};
use crate::interp::LinearInterpolator;
use crate::models::{Component, ModelSpectrum, ParameterSpace, Spectrum};

/// Anything that turns a full parameter vector into a spectrum.
///
/// `name_stem` must be unique among concurrent calls; implementations may
/// use it to name scratch files.
pub trait SpectrumModel: Sync {
    fn compute(&self, full_params: &[f64], name_stem: &str) -> Result<ModelSpectrum>;
}

#[derive(Debug, Clone)]
pub struct ExternalModel {
    pub executable: PathBuf,
    pub work_dir: PathBuf,
    pub redshift: f64,
    pub theta: f64,
    pub min_freq: f64,
    pub max_freq: f64,
    pub num_points: usize,
    pub extra_args: Vec<String>,
    pub keep_files: bool,
    space: ParameterSpace,
}

impl ExternalModel {
    pub fn new(config: &ModelConfig, redshift: f64, space: ParameterSpace) -> Self {
        ExternalModel {
            executable: config.executable.clone(),
            work_dir: config.work_dir.clone(),
            redshift,
            theta: config.theta,
            min_freq: config.min_freq,
            max_freq: config.max_freq,
            num_points: config.num_points,
            extra_args: config.extra_args.clone(),
            keep_files: config.keep_files,
            space,
        }
    }

    pub fn command_args(&self, full_params: &[f64], name_stem: &str) -> Result<Vec<String>> {
        let mut args = vec![
            self.work_dir.display().to_string(),
            name_stem.to_string(),
            self.redshift.to_string(),
            self.theta.to_string(),
            self.min_freq.to_string(),
            self.max_freq.to_string(),
            self.num_points.to_string(),
        ];
        args.extend(
            self.space
                .to_model_arguments(full_params)?
                .into_iter()
                .map(|v| format!("{v:e}")),
        );
        args.extend(self.extra_args.iter().cloned());
        Ok(args)
    }

    fn component_path(&self, name_stem: &str, component: Component) -> PathBuf {
        self.work_dir
            .join(format!("{name_stem}_{}.dat", component.file_suffix()))
    }

    fn read_components(&self, name_stem: &str) -> Result<Vec<(Component, Spectrum)>> {
        let mut components = Vec::new();
        for component in Component::ALL {
            if component.eic_only() && !self.space.eic() {
                continue;
            }
            let path = self.component_path(name_stem, component);
            if !path.exists() {
                if component.required() {
                    return Err(BlazarError::ModelOutput {
                        path,
                        reason: "missing".into(),
                    });
                }
                debug!("optional component {} not written", path.display());
                continue;
            }
            let spectrum = read_dat_spectrum(&path)?;
            if spectrum.is_empty() {
                warn!("{} contains no finite points", path.display());
                continue;
            }
            components.push((component, spectrum));
        }
        Ok(components)
    }
}

impl SpectrumModel for ExternalModel {
    fn compute(&self, full_params: &[f64], name_stem: &str) -> Result<ModelSpectrum> {
        let args = self.command_args(full_params, name_stem)?;
        debug!("running {} {}", self.executable.display(), args.join(" "));

        let output = Command::new(&self.executable)
            .args(&args)
            .current_dir(&self.work_dir)
            .output()
            .map_err(|e| BlazarError::io(&self.executable, e))?;
        if !output.status.success() {
            return Err(BlazarError::ModelFailed {
                executable: self.executable.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let components = self.read_components(name_stem);
        if !self.keep_files {
            remove_stem_files(&self.work_dir, name_stem);
        }
        let components = components?;
        let total = sum_components(&components)?;
        Ok(ModelSpectrum { total, components })
    }
}

/// Parse a whitespace-separated model output file.
pub fn read_dat_spectrum(path: &Path) -> Result<Spectrum> {
    let contents = fs::read_to_string(path).map_err(|e| BlazarError::io(path, e))?;
    let mut log_freq = Vec::new();
    let mut log_flux = Vec::new();
    for (n, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 3 {
            return Err(BlazarError::ModelOutput {
                path: path.to_path_buf(),
                reason: format!("line {} has {} columns, need 3", n + 1, cols.len()),
            });
        }
        let parse = |s: &str| {
            s.parse::<f64>().map_err(|_| BlazarError::ModelOutput {
                path: path.to_path_buf(),
                reason: format!("line {}: '{s}' is not a number", n + 1),
            })
        };
        let x = parse(cols[0])?;
        let y = parse(cols[2])?;
        if x.is_finite() && y.is_finite() {
            log_freq.push(x);
            log_flux.push(y);
        }
    }
    Ok(Spectrum::new(log_freq, log_flux))
}

/// Sum components in linear flux over the union of their frequencies.
///
/// A component only contributes inside its own frequency range; frequencies
/// where nothing contributes are dropped.
pub fn sum_components(components: &[(Component, Spectrum)]) -> Result<Spectrum> {
    let mut grid: Vec<f64> = components
        .iter()
        .flat_map(|(_, s)| s.log_freq.iter().copied())
        .collect();
    grid.sort_by(f64::total_cmp);
    grid.dedup();

    let interpolators = components
        .iter()
        .filter(|(_, s)| s.len() >= 2)
        .map(|(_, s)| LinearInterpolator::new(&s.log_freq, &s.log_flux))
        .collect::<Result<Vec<_>>>()?;

    let mut log_freq = Vec::with_capacity(grid.len());
    let mut log_flux = Vec::with_capacity(grid.len());
    for x in grid {
        let total: f64 = interpolators
            .iter()
            .filter(|f| {
                let (lo, hi) = f.x_range();
                lo <= x && x <= hi
            })
            .map(|f| 10f64.powf(f.eval(x)))
            .sum();
        if total > 0.0 && total.is_finite() {
            log_freq.push(x);
            log_flux.push(total.log10());
        }
    }
    if log_freq.len() < 2 {
        return Err(BlazarError::ModelOutput {
            path: PathBuf::new(),
            reason: "model produced fewer than two spectrum points".into(),
        });
    }
    Ok(Spectrum::new(log_freq, log_flux))
}

/// `<prefix>_<pid>_<random hex>`, so concurrent runs sharing a work
/// directory never read or delete each other's files.
pub fn unique_stem(prefix: &str) -> String {
    format!("{prefix}_{}_{:08x}", std::process::id(), rand::random::<u32>())
}

/// Delete every `<stem>_*` file in `dir`; failures are only logged.
pub fn remove_stem_files(dir: &Path, name_stem: &str) {
    let prefix = format!("{name_stem}_");
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("cannot list {}: {e}", dir.display());
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|name| name.starts_with(&prefix));
        if matches && path.is_file() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("cannot remove {}: {e}", path.display());
            }
        }
    }
}

/// Binds a model to a parameter space so callers can pass sampled vectors.
pub struct ModelRunner<'a, M: SpectrumModel + ?Sized> {
    pub model: &'a M,
    pub space: &'a ParameterSpace,
}

impl<'a, M: SpectrumModel + ?Sized> ModelRunner<'a, M> {
    pub fn new(model: &'a M, space: &'a ParameterSpace) -> Self {
        ModelRunner { model, space }
    }

    pub fn run(&self, free_params: &[f64], name_stem: &str) -> Result<ModelSpectrum> {
        let full = self.space.expand(free_params)?;
        self.model.compute(&full, name_stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unique_stems_do_not_collide() {
        let a = unique_stem("best");
        let b = unique_stem("best");
        assert!(a.starts_with(&format!("best_{}_", std::process::id())));
        assert_ne!(a, b);

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("best_ss.dat"), "").unwrap();
        fs::write(dir.path().join(format!("{a}_ss.dat")), "").unwrap();
        remove_stem_files(dir.path(), &a);
        assert!(dir.path().join("best_ss.dat").exists());
        assert!(!dir.path().join(format!("{a}_ss.dat")).exists());
    }

    #[test]
    fn parses_dat_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_ss.dat");
        fs::write(&path, "# header\n10.0 0.0 -12.0\n\n11.0 0.0 -11.5\n12.0 0.0 nan\n").unwrap();
        let s = read_dat_spectrum(&path).unwrap();
        assert_eq!(s.log_freq, vec![10.0, 11.0]);
        assert_eq!(s.log_flux, vec![-12.0, -11.5]);
    }

    #[test]
    fn short_lines_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_ss.dat");
        fs::write(&path, "10.0 -12.0\n").unwrap();
        assert!(read_dat_spectrum(&path).is_err());
    }

    #[test]
    fn components_sum_in_linear_space() {
        let a = Spectrum::new(vec![10.0, 12.0], vec![-12.0, -12.0]);
        let b = Spectrum::new(vec![11.0, 13.0], vec![-12.0, -12.0]);
        let total = sum_components(&[(Component::Synchrotron, a), (Component::SelfCompton, b)]).unwrap();
        assert_eq!(total.log_freq, vec![10.0, 11.0, 12.0, 13.0]);
        assert_relative_eq!(total.log_flux[0], -12.0);
        assert_relative_eq!(total.log_flux[1], -12.0 + 2f64.log10(), epsilon = 1e-12);
        assert_relative_eq!(total.log_flux[2], -12.0 + 2f64.log10(), epsilon = 1e-12);
        assert_relative_eq!(total.log_flux[3], -12.0);
    }

    #[test]
    fn removes_only_matching_stem() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("run1_ss.dat"), "").unwrap();
        fs::write(dir.path().join("run1_cs.dat"), "").unwrap();
        fs::write(dir.path().join("run10_ss.dat"), "").unwrap();
        remove_stem_files(dir.path(), "run1");
        assert!(!dir.path().join("run1_ss.dat").exists());
        assert!(!dir.path().join("run1_cs.dat").exists());
        assert!(dir.path().join("run10_ss.dat").exists());
    }

    #[test]
    fn command_line_layout() {
        let config = ModelConfig {
            executable: "bj02".into(),
            work_dir: "calc".into(),
            theta: 0.5,
            min_freq: 8.0,
            max_freq: 26.0,
            num_points: 99,
            extra_args: vec!["--fast".into()],
            keep_files: false,
        };
        let space = ParameterSpace::new(false, &[]).unwrap();
        let model = ExternalModel::new(&config, 0.1, space);
        let params = [10.0, 2.0, 2.0, 3.0, 1.0, 5.0, 3.0, -1.0, 16.0];
        let args = model.command_args(&params, "best").unwrap();
        assert_eq!(args.len(), 7 + 9 + 1);
        assert_eq!(&args[..3], &["calc", "best", "0.1"]);
        assert_eq!(args[6], "99");
        assert_eq!(args[8].parse::<f64>().unwrap(), 100.0);
        assert_eq!(args.last().unwrap(), "--fast");
    }
}
