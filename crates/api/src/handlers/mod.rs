//! Request handlers.
//!
//! Each submodule provides thin async handlers that extract the account
//! context and body, delegate to [`MonitoringService`] and map errors via
//! [`AppError`].
//!
//! [`MonitoringService`]: crate::service::MonitoringService
//! [`AppError`]: crate::error::AppError

pub mod admin;
pub mod alarms;
pub mod metrics;
