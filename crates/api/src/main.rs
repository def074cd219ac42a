use std::sync::Arc;

use anyhow::Context;

use helpdesk_api::app::{AppState, build_app};
use helpdesk_api::config::{BootstrapAdmin, ServerConfig};
use helpdesk_auth::{
    AuthService, Blacklist, InMemoryBlacklist, InMemoryRefreshTokenRepository,
    InMemoryUserDirectory, JwtConfig, RefreshTokenRepository, RoleAssignment, RoleClaim, User,
    UserDirectory,
};
use helpdesk_core::UserId;
use helpdesk_infra::{
    PostgresRefreshTokenRepository, PostgresUserDirectory, RedisBlacklist, RefreshTokenSweeper, db,
};

const DEV_JWT_SECRET: &str = "dev-secret";
const DB_MAX_CONNECTIONS: u32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    helpdesk_observability::init();

    let jwt = JwtConfig::from_lookup(|key| {
        let value = std::env::var(key).ok();
        if key == "JWT_SECRET" && value.is_none() {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            return Some(DEV_JWT_SECRET.to_string());
        }
        value
    })
    .context("invalid JWT configuration")?;
    let server = ServerConfig::from_env().context("invalid server configuration")?;

    let (directory, refresh_tokens) = user_backends(&server).await?;
    let blacklist = blacklist_backend(&server).await?;

    let service = AuthService::new(jwt, directory, refresh_tokens, blacklist);
    let sweeper = RefreshTokenSweeper::spawn(service.refresh_tokens().clone(), server.sweep_interval);

    let app = build_app(AppState::new(service, server.cookie_secure));
    let listener = tokio::net::TcpListener::bind(&server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", server.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.shutdown().await;
    Ok(())
}

async fn user_backends(
    server: &ServerConfig,
) -> anyhow::Result<(Arc<dyn UserDirectory>, Arc<dyn RefreshTokenRepository>)> {
    match &server.database_url {
        Some(url) => {
            let pool = db::connect(url, DB_MAX_CONNECTIONS)
                .await
                .context("failed to connect to postgres")?;
            db::ensure_schema(&pool)
                .await
                .context("failed to apply schema")?;

            let directory = PostgresUserDirectory::new(pool.clone());
            if let Some(admin) = &server.bootstrap_admin {
                let id = directory
                    .find_by_email(&admin.email)
                    .await?
                    .map(|u| u.id)
                    .unwrap_or_else(UserId::new);
                let (user, assignments) = bootstrap_user(id, admin);
                directory.upsert_user(&user, &admin.password, &assignments).await?;
                tracing::info!(email = %admin.email, "bootstrap administrator ensured");
            }

            let directory: Arc<dyn UserDirectory> = Arc::new(directory);
            let refresh_tokens: Arc<dyn RefreshTokenRepository> =
                Arc::new(PostgresRefreshTokenRepository::new(pool));
            Ok((directory, refresh_tokens))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; users and sessions are kept in memory");
            let directory = InMemoryUserDirectory::new();
            if let Some(admin) = &server.bootstrap_admin {
                let (user, assignments) = bootstrap_user(UserId::new(), admin);
                directory.add_user(user, &admin.password, assignments)?;
                tracing::info!(email = %admin.email, "bootstrap administrator created");
            }
            let directory: Arc<dyn UserDirectory> = Arc::new(directory);
            let refresh_tokens: Arc<dyn RefreshTokenRepository> =
                Arc::new(InMemoryRefreshTokenRepository::new());
            Ok((directory, refresh_tokens))
        }
    }
}

async fn blacklist_backend(server: &ServerConfig) -> anyhow::Result<Arc<dyn Blacklist>> {
    match &server.redis_url {
        Some(url) => {
            let blacklist = RedisBlacklist::connect(url, None)
                .await
                .context("failed to connect to redis")?;
            let blacklist: Arc<dyn Blacklist> = Arc::new(blacklist);
            Ok(blacklist)
        }
        None => {
            tracing::warn!("REDIS_URL not set; blacklist is local to this process");
            let blacklist: Arc<dyn Blacklist> = Arc::new(InMemoryBlacklist::new());
            Ok(blacklist)
        }
    }
}

fn bootstrap_user(id: UserId, admin: &BootstrapAdmin) -> (User, Vec<RoleAssignment>) {
    (
        User::new(id, admin.email.clone()),
        vec![RoleAssignment::active(RoleClaim::platform_admin())],
    )
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
