//! Hybrid cell-type deconvolution for long-read (ONT) methylation data.
//!
//! Estimates the mixture proportions of known (and optionally unknown)
//! cell types that best explain a bulk bedMethyl measurement, given a
//! reference panel of per-cell-type methylation signals.

pub mod align;
pub mod data;
pub mod deconvolve;
pub mod error;
pub mod filters;
pub mod output;
pub mod pipeline;
pub mod qp;
pub mod reader;
pub mod records;
pub mod sampler;
pub mod types;
