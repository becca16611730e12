//! Quota tracking

pub mod bucket;
pub mod headers;

pub use bucket::{Bucket, BucketKey, BucketSnapshot, Reservation};
pub use headers::{RateLimitHeaders, RateLimitScope, RetryAfter};
