//! Request extractors.
//!
//! - [`context::AccountContext`] -- account and region a request operates in.

pub mod context;
