pub mod auth;
pub mod guard;
pub mod response;
pub mod unify;

pub use auth::{jwt_auth_middleware, refresh_token_middleware, AuthUser, NEW_ACCESS_TOKEN_HEADER};
pub use guard::{RequireAdmin, RequireSuperAdmin};
pub use response::{ApiResponse, ApiResult, Envelope, SUCCESS_MSG};
pub use unify::{skip_envelope, unify_response, RawResponse};
