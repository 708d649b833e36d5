//! Alarm ARN formatting.

use crate::types::RequestContext;

/// `arn:aws:cloudwatch:{region}:{account}:alarm:{name}`
pub fn alarm_arn(context: &RequestContext, name: &str) -> String {
    format!(
        "arn:aws:cloudwatch:{}:{}:alarm:{}",
        context.region, context.account_id, name
    )
}
