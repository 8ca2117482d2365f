//! Diagnostic plots for MCMC fits of blazar spectral energy distributions.
//!
//! The sampler's chain is read from CSV, the best fit and the samples
//! within one sigma of it are located, and the external emission-model
//! executable is run over a selection of those samples to build the
//! one-sigma envelope of the model spectrum.

pub mod chain;
pub mod config;
pub mod data;
pub mod envelope;
pub mod error;
pub mod interp;
pub mod models;
pub mod plots;
pub mod report;
pub mod residuals;
pub mod sed_model;

pub use error::{BlazarError, Result};
