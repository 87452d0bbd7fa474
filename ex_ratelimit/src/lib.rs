//! # ex_ratelimit
//!
//! Client-side admission control for a third-party exchange API: sliding
//! window quotas per endpoint category, wrapped in a cold-start policy that
//! keeps a freshly started process from bursting its backlog.

pub mod category;
pub mod category_limiter;
pub mod cold_start;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod limiter;
pub mod presets;
pub mod resolver;
pub mod time;
pub mod window;

pub use category::Category;
pub use category::CategoryRule;
pub use category::MeasurementUnit;
pub use category_limiter::CategoryLimiter;
pub use category_limiter::CategoryLimiterBuilder;
pub use cold_start::CategorySnapshot;
pub use cold_start::ColdStartGate;
pub use cold_start::ColdStartPolicy;
pub use cold_start::Phase;
pub use config::LimiterConfig;
pub use coordinator::RateLimiterCoordinator;
pub use error::RateLimitError;
pub use error::Result;
pub use limiter::Admission;
pub use limiter::RateLimiter;
pub use resolver::CategoryResolver;
pub use resolver::ResolverRule;
pub use time::Clock;
pub use time::ManualClock;
pub use time::MonotonicClock;
pub use window::RateWindow;
pub use window::SlidingWindowCounter;
pub use window::WindowSnapshot;
