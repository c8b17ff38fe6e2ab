//! # lf-inference
//!
//! Compartment-ODE fitting of parasite count distributions.
//!
//! The pipeline: build a measured count histogram and a driver series
//! from tabular columns, then estimate the kinetic rate constants whose
//! integrated compartment model best reproduces the measured
//! distribution — once against a constant driver (reference) and once
//! against the measured driver (forced).

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Sentinel-cage record aggregation into deployment windows.
pub mod cages;
/// Environmental driver step-function sampling.
pub mod driver;
/// Two-scenario rate-constant estimation.
pub mod fit;
/// Measured count histogram construction and downsampling.
pub mod histogram;
/// Compartment accumulation model and its topologies.
pub mod model;
/// Distribution-distance objective over rate proposals.
pub mod objective;
/// Adaptive Dormand–Prince integration.
pub mod ode;
/// Nelder–Mead minimization wrapper.
pub mod optimizer;
/// Earth-Mover distance over bucket grids.
pub mod wasserstein;

pub use cages::{BadCountPolicy, CageRecord, DeploymentWindow, aggregate_cages};
pub use driver::{Driver, DriverSeries};
pub use fit::{EstimatorConfig, RateEstimator};
pub use histogram::{CountHistogram, build_histogram, downsample, is_missing};
pub use model::{CompartmentOde, Topology};
pub use objective::{DistanceObjective, Metric};
pub use ode::{OdeOptions, OdeSystem, rk45};
pub use optimizer::{NelderMeadOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
pub use wasserstein::wasserstein_indexed;
