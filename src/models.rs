use serde::{Deserialize, Serialize};

use crate::error::{BlazarError, Result};

/// Scale a parameter is sampled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scale {
    Linear,
    Log10,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub scale: Scale,
}

const fn spec(name: &'static str, label: &'static str, scale: Scale) -> ParamSpec {
    ParamSpec { name, label, scale }
}

/// Synchrotron self-Compton parameters, in sampling order.
pub const SSC_PARAMS: [ParamSpec; 9] = [
    spec("delta", "δ", Scale::Linear),
    spec("K", "log K", Scale::Log10),
    spec("n1", "α₁", Scale::Linear),
    spec("n2", "α₂", Scale::Linear),
    spec("gamma_min", "log γ_min", Scale::Log10),
    spec("gamma_max", "log γ_max", Scale::Log10),
    spec("gamma_break", "log γ_break", Scale::Log10),
    spec("B", "log B", Scale::Log10),
    spec("R", "log R", Scale::Log10),
];

/// Extra parameters appended when external inverse Compton is modelled.
pub const EIC_PARAMS: [ParamSpec; 4] = [
    spec("bb_temp", "log T_bb", Scale::Log10),
    spec("l_nuc", "log L_nuc", Scale::Log10),
    spec("tau", "log τ", Scale::Log10),
    spec("blob_dist", "log d_blob", Scale::Log10),
];

/// Full parameter list for a model, with some entries optionally pinned.
///
/// MCMC samples only carry the free parameters; `expand` rebuilds the full
/// vector the model executable expects.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    eic: bool,
    fixed: Vec<Option<f64>>,
}

impl ParameterSpace {
    pub fn full_specs(eic: bool) -> Vec<ParamSpec> {
        let mut specs = SSC_PARAMS.to_vec();
        if eic {
            specs.extend_from_slice(&EIC_PARAMS);
        }
        specs
    }

    pub fn full_len(eic: bool) -> usize {
        SSC_PARAMS.len() + if eic { EIC_PARAMS.len() } else { 0 }
    }

    /// `fixed` holds one entry per full parameter, `None` meaning free. An
    /// empty slice means every parameter is free.
    pub fn new(eic: bool, fixed: &[Option<f64>]) -> Result<Self> {
        let n = Self::full_len(eic);
        let fixed = if fixed.is_empty() {
            vec![None; n]
        } else {
            fixed.to_vec()
        };
        if fixed.len() != n {
            return Err(BlazarError::Config(format!(
                "fixed_params has {} entries, model has {} parameters",
                fixed.len(),
                n
            )));
        }
        if fixed.iter().all(Option::is_some) {
            return Err(BlazarError::Config("every parameter is fixed".into()));
        }
        if let Some(v) = fixed.iter().flatten().find(|v| !v.is_finite()) {
            return Err(BlazarError::Config(format!("fixed parameter value {v} is not finite")));
        }
        Ok(ParameterSpace { eic, fixed })
    }

    pub fn eic(&self) -> bool {
        self.eic
    }

    /// Number of sampled (free) dimensions.
    pub fn dims(&self) -> usize {
        self.fixed.iter().filter(|f| f.is_none()).count()
    }

    pub fn free_specs(&self) -> Vec<ParamSpec> {
        Self::full_specs(self.eic)
            .into_iter()
            .zip(self.fixed.iter())
            .filter(|(_, f)| f.is_none())
            .map(|(s, _)| s)
            .collect()
    }

    pub fn free_names(&self) -> Vec<&'static str> {
        self.free_specs().iter().map(|s| s.name).collect()
    }

    pub fn free_labels(&self) -> Vec<&'static str> {
        self.free_specs().iter().map(|s| s.label).collect()
    }

    pub fn expand(&self, free: &[f64]) -> Result<Vec<f64>> {
        if free.len() != self.dims() {
            return Err(BlazarError::DimensionMismatch {
                expected: self.dims(),
                found: free.len(),
            });
        }
        let mut values = free.iter();
        Ok(self
            .fixed
            .iter()
            .map(|f| match f {
                Some(v) => *v,
                // counts match, checked above
                None => *values.next().unwrap_or(&f64::NAN),
            })
            .collect())
    }

    /// Values in the units the model executable reads.
    pub fn to_model_arguments(&self, full: &[f64]) -> Result<Vec<f64>> {
        let specs = Self::full_specs(self.eic);
        if full.len() != specs.len() {
            return Err(BlazarError::DimensionMismatch {
                expected: specs.len(),
                found: full.len(),
            });
        }
        Ok(specs
            .iter()
            .zip(full)
            .map(|(s, v)| match s.scale {
                Scale::Linear => *v,
                Scale::Log10 => 10f64.powf(*v),
            })
            .collect())
    }
}

/// A spectrum as log10 ν / log10 νFν pairs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Spectrum {
    pub log_freq: Vec<f64>,
    pub log_flux: Vec<f64>,
}

impl Spectrum {
    pub fn new(log_freq: Vec<f64>, log_flux: Vec<f64>) -> Self {
        Spectrum { log_freq, log_flux }
    }

    pub fn len(&self) -> usize {
        self.log_freq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_freq.is_empty()
    }

    pub fn freq(&self) -> Vec<f64> {
        self.log_freq.iter().map(|x| 10f64.powf(*x)).collect()
    }

    pub fn flux(&self) -> Vec<f64> {
        self.log_flux.iter().map(|y| 10f64.powf(*y)).collect()
    }

    pub fn max_flux(&self) -> f64 {
        self.flux().into_iter().fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.log_freq.iter().copied().zip(self.log_flux.iter().copied())
    }
}

/// Emission components the model executable writes, one file each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Synchrotron,
    SelfCompton,
    SecondOrderCompton,
    ExternalCompton,
    Nucleus,
}

impl Component {
    pub const ALL: [Component; 5] = [
        Component::Synchrotron,
        Component::SelfCompton,
        Component::SecondOrderCompton,
        Component::ExternalCompton,
        Component::Nucleus,
    ];

    pub fn file_suffix(self) -> &'static str {
        match self {
            Component::Synchrotron => "ss",
            Component::SelfCompton => "cs",
            Component::SecondOrderCompton => "cs2",
            Component::ExternalCompton => "ecs",
            Component::Nucleus => "nuc",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Component::Synchrotron => "Synchrotron",
            Component::SelfCompton => "Self Compton",
            Component::SecondOrderCompton => "2nd Order SC",
            Component::ExternalCompton => "EIC",
            Component::Nucleus => "nucleus",
        }
    }

    pub fn required(self) -> bool {
        matches!(self, Component::Synchrotron | Component::SelfCompton)
    }

    pub fn eic_only(self) -> bool {
        matches!(self, Component::ExternalCompton | Component::Nucleus)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelSpectrum {
    pub total: Spectrum,
    pub components: Vec<(Component, Spectrum)>,
}

impl ModelSpectrum {
    pub fn component(&self, which: Component) -> Option<&Spectrum> {
        self.components
            .iter()
            .find(|(c, _)| *c == which)
            .map(|(_, s)| s)
    }
}

/// One observed SED point, linear units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SedPoint {
    pub instrument: String,
    pub nu: f64,
    pub nu_err_low: f64,
    pub nu_err_high: f64,
    pub nufnu: f64,
    pub err_low: f64,
    pub err_high: f64,
    pub upper_limit: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SedData {
    pub points: Vec<SedPoint>,
}

impl SedData {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn nu(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.nu).collect()
    }

    pub fn nufnu(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.nufnu).collect()
    }

    pub fn detections(&self) -> impl Iterator<Item = &SedPoint> {
        self.points.iter().filter(|p| !p.upper_limit)
    }
}
