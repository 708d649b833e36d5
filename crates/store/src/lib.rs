//! Metric time-series storage.
//!
//! - [`MetricStore`] -- concurrent per-identity series with statistic queries.
//! - [`StatisticQuery`] -- range query over an epoch-aligned period grid.
//! - [`MetricSource`] -- async read seam consumed by the alarm scheduler;
//!   [`StoreSource`] serves it from a shared [`MetricStore`].

pub mod aggregate;
pub mod query;
pub mod series;
pub mod source;
pub mod store;

pub use query::{
    align_to_period, DimensionFilter, MetricFilter, MetricTarget, StatisticBucket, StatisticQuery,
};
pub use series::SeriesSnapshot;
pub use source::{MetricSource, StoreSource};
pub use store::{MetricStore, MetricSummary};
