#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core library for life-stats
//!
//! life-stats pulls personal metrics (step counts, weather, task-tracking hours) from
//! third-party APIs and persists them into a per-user, per-metric time series store.
//! Progress is tracked per (user, metric) so that re-runs only fetch new data.
//!
//! # Module Organization
//!
//! - [`points`]: Normalized data points and the persisted record shapes
//! - [`date_range`]: Conversion of watermarks and manual overrides into fetch windows
//! - [`integrations`]: The pluggable data sources and the registry that names them
//! - [`secrets`]: Per-user credential lookup
//! - [`store`]: The metrics and run-watermark tables
//! - [`orchestrator`]: The per-user/per-metric fetch-and-store loop
//! - [`commands`]: Command-line interface

pub type Result<T, E = ohno::AppError> = core::result::Result<T, E>;

pub mod commands;
pub mod date_range;
mod error;
pub mod integrations;
pub mod orchestrator;
pub mod points;
pub mod secrets;
pub mod store;

pub use crate::commands::{Host, run};
pub use crate::error::{Error, ErrorKind};
