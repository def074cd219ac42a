//! Shared blacklist backends.
//!
//! The in-memory list in `helpdesk-auth` is process-local; multi-instance
//! deployments need the Redis backend so a logout on one node is honored by
//! every other node.

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "redis")]
pub use redis::RedisBlacklist;
