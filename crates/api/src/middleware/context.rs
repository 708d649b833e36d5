//! Account/region extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use metricwatch_core::types::RequestContext;

use crate::error::AppError;
use crate::state::AppState;

/// Header naming the calling account.
pub const ACCOUNT_HEADER: &str = "x-account-id";

/// Header naming the target region.
pub const REGION_HEADER: &str = "x-region";

/// Account and region taken from the `x-account-id` / `x-region` headers,
/// falling back to the configured defaults.
///
/// ```ignore
/// async fn my_handler(AccountContext(ctx): AccountContext) -> AppResult<Json<()>> {
///     tracing::info!(account = %ctx.account_id, region = %ctx.region, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AccountContext(pub RequestContext);

impl FromRequestParts<AppState> for AccountContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let account_id = header_or(parts, ACCOUNT_HEADER, &state.config.default_account_id)?;
        let region = header_or(parts, REGION_HEADER, &state.config.default_region)?;
        Ok(AccountContext(RequestContext::new(account_id, region)))
    }
}

fn header_or(parts: &Parts, name: &str, default: &str) -> Result<String, AppError> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(default.to_string());
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::BadRequest(format!("Header {name} must be visible ASCII")))?
        .trim();
    if value.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(value.to_string())
    }
}
