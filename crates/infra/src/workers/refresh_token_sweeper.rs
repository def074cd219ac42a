//! Background task that purges expired refresh tokens.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use helpdesk_auth::RefreshTokenStore;

/// Handle to stop and join the sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Request graceful shutdown and wait for the task to stop.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

#[derive(Debug)]
pub struct RefreshTokenSweeper;

impl RefreshTokenSweeper {
    /// Spawn a task calling `clean_expired` every `interval`.
    ///
    /// Failures are logged and retried on the next tick.
    pub fn spawn(store: RefreshTokenStore, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.clean_expired(Utc::now()).await {
                            Ok(deleted) if deleted > 0 => {
                                info!(worker = "refresh_token_sweeper", deleted, "sweep completed");
                            }
                            Ok(_) => {}
                            Err(err) => {
                                warn!(worker = "refresh_token_sweeper", error = %err, "sweep failed");
                            }
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use helpdesk_auth::{
        DeviceInfo, InMemoryRefreshTokenRepository, InMemoryUserDirectory, JwtConfig, User,
    };
    use helpdesk_core::UserId;

    use super::*;

    #[tokio::test]
    async fn sweeps_expired_tokens_until_shut_down() {
        let mut config = JwtConfig::new("sweeper-test-secret");
        config.refresh_ttl_minutes = 1;
        let repository = Arc::new(InMemoryRefreshTokenRepository::new());
        let store = RefreshTokenStore::new(
            repository.clone(),
            Arc::new(InMemoryUserDirectory::new()),
            &config,
        );

        let user = User::new(UserId::new(), "sweep@example.com");
        let long_ago = Utc::now() - chrono::Duration::minutes(5);
        store
            .create(&user, &DeviceInfo::default(), long_ago)
            .await
            .unwrap();
        store
            .create(&user, &DeviceInfo::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(repository.len(), 2);

        let handle = RefreshTokenSweeper::spawn(store, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        assert_eq!(repository.len(), 1);
    }
}
