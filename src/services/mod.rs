pub mod cache;
pub mod lock;
pub mod masking;
pub mod payments;
pub mod publisher;
pub mod rate_limiter;

pub use cache::{Cache, CacheError};
pub use lock::{LockError, LockGuard, LockManager, LockSettings};
pub use masking::{DataMasker, MaskingError};
pub use payments::PaymentService;
pub use publisher::{PublishError, Publisher, PublisherSettings};
pub use rate_limiter::{RateLimitSettings, RateLimiter};
