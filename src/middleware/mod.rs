/// Middleware module
///
/// Identity extraction and request-scoped concerns.

mod identity;
mod jwt_middleware;
mod request_logger;

pub use identity::{extract_identity, maybe_identity, Identity};
pub use jwt_middleware::JwtMiddleware;
pub use request_logger::RequestLogger;
