//! Shared response envelope types for API handlers.
//!
//! JSON API responses use a `{ "data": ... }` envelope. The raw-metrics
//! endpoint is the exception and returns its payload bare.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
