//! In-memory cache with single-flight computation.
//!
//! The cache is ephemeral: nothing survives a restart, and losing an entry
//! only costs a recomputation. What it guarantees is that concurrent callers
//! asking for the same key while its value is being computed all wait on one
//! computation instead of each starting their own.
//!
//! # Eviction
//! - **TTL**: an entry expires a fixed duration after insertion.
//! - **Capacity**: when full, the least-recently-inserted entry is evicted.
//!
//! Both are optional; [`SingleFlightCache::new`] is unbounded and never
//! expires.

mod flight;

pub use crate::flight::SingleFlightCache;
