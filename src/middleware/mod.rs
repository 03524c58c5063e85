pub mod auth;
pub mod body_limit;
pub mod intent;
pub mod security_headers;

pub use auth::{jwt_auth_middleware, AuthUser};
pub use body_limit::limit_middleware;
pub use intent::intent_middleware;
pub use security_headers::security_headers_middleware;
