// Cache module.
// Durable snapshot file plus the in-memory tier with single-flight revalidation.

pub mod durable;
pub mod memory;
pub mod paths;
pub mod store;

pub use durable::{DurableCache, DurableSnapshot};
pub use memory::{CacheRead, CachedRollups, MemoryCache, RevalidationGuard};
