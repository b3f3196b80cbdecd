//! Core power-distribution and timeseries-resampling engine for a
//! microgrid control SDK.
//!
//! This crate implements two independent subsystems:
//!
//! - [`distribution`]: SoC-equalizing power allocation across batteries
//!   and inverters, with concurrent dispatch, timeout, and per-device
//!   failure classification.
//! - [`resampling`]: resampling of asynchronous sample streams onto a
//!   fixed output period, with adaptive buffering and drift-free
//!   scheduling.
//!
//! Both are driven by external collaborators — a device RPC client, a
//! component topology graph, and a battery health tracker — which a
//! consumer supplies via the traits in [`rpc`], [`topology`], and
//! [`health`].

pub mod cache;
pub mod config;
pub mod distribution;
pub mod domain;
pub mod health;
pub mod resampling;
pub mod rpc;
pub mod telemetry;
pub mod topology;

pub use distribution::PowerDistributor;
pub use resampling::Resampler;
