//! Alarm registry and the per-alarm evaluation scheduler.
//!
//! [`AlarmScheduler`] owns one cancellable tokio task per alarm. Each tick
//! re-reads the definition from the [`AlarmRegistry`], queries the metric
//! source for the most recent complete period, runs the state machine from
//! `metricwatch_core::evaluation`, persists the runtime state and fires
//! actions on real transitions.

pub mod config;
pub mod registry;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use registry::{AlarmRegistry, InMemoryAlarmRegistry, StoredAlarm};
pub use scheduler::AlarmScheduler;
