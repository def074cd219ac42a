//! Long-running background tasks.

pub mod refresh_token_sweeper;

pub use refresh_token_sweeper::{RefreshTokenSweeper, SweeperHandle};
