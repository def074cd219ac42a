//! Refresh-token persistence.

pub mod postgres;

pub use postgres::PostgresRefreshTokenRepository;
