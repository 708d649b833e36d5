//! Domain types shared across the metricwatch workspace.
//!
//! - [`metric`] -- metric identities, units and datapoints.
//! - [`statistic`] -- statistic kinds (`Average`, `p99`, ...).
//! - [`alarm`] -- alarm definitions and their persisted runtime state.
//! - [`evaluation`] -- the pure alarm state machine.

pub mod alarm;
pub mod arn;
pub mod error;
pub mod evaluation;
pub mod metric;
pub mod statistic;
pub mod types;
pub mod validation;
