pub mod auth;
pub mod response;

pub use auth::{identity_middleware, Claims};
pub use response::{ApiResponse, ApiResult, Pagination};
