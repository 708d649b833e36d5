//! Shared input validation helpers.
//!
//! Provides reusable checks used by alarm definitions and the request layer.

use crate::error::CoreError;

/// Longest accepted alarm name.
pub const MAX_ALARM_NAME_LEN: usize = 255;

/// Validate that an alarm name is non-empty and at most 255 characters.
pub fn validate_alarm_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() || name.chars().count() > MAX_ALARM_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "AlarmName must be between 1 and {MAX_ALARM_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate an evaluation/aggregation period in seconds.
///
/// High-resolution periods (10, 30) are allowed; anything else must be a
/// positive multiple of 60.
pub fn validate_period(period_secs: u32) -> Result<(), CoreError> {
    match period_secs {
        10 | 30 => Ok(()),
        p if p > 0 && p % 60 == 0 => Ok(()),
        p => Err(CoreError::Validation(format!(
            "Period must be 10, 30 or a multiple of 60, got {p}"
        ))),
    }
}

/// Validate a query period in seconds. Queries accept any positive period.
pub fn validate_query_period(period_secs: u32) -> Result<(), CoreError> {
    if period_secs == 0 {
        return Err(CoreError::Validation(
            "Period must be greater than zero".into(),
        ));
    }
    Ok(())
}
