pub mod extract;
pub mod protected;
pub mod public;

use crate::error::ApiError;

/// Fallback for unmatched paths.
pub async fn not_found() -> ApiError {
    ApiError::not_found("接口不存在")
}
