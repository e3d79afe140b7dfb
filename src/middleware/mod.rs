pub mod rate_limit;
pub mod request_logger;
pub mod security_headers;

pub use rate_limit::{rate_limit_middleware, USER_ID_HEADER};
pub use request_logger::{request_logger_middleware, REQUEST_ID_HEADER};
pub use security_headers::security_headers_middleware;
