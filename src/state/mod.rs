pub mod analytics_cache;

pub use analytics_cache::{AnalyticsCache, CacheStats};
