//! Infrastructure layer: Postgres repositories, the Redis blacklist and
//! background workers backing `helpdesk-auth`.

pub mod blacklist;
pub mod db;
pub mod refresh_tokens;
pub mod users;
pub mod workers;


pub use refresh_tokens::PostgresRefreshTokenRepository;
pub use users::PostgresUserDirectory;
pub use workers::{RefreshTokenSweeper, SweeperHandle};

#[cfg(feature = "redis")]
pub use blacklist::RedisBlacklist;
