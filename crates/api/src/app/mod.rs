//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response bodies
//! - `client.rs`: bearer, cookie and device metadata helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Router, middleware::from_fn_with_state, routing::get};

use helpdesk_auth::{
    AuthService, InMemoryBlacklist, InMemoryRefreshTokenRepository, InMemoryUserDirectory,
    JwtConfig, RoleCode,
};

use crate::middleware::{RoleGuard, auth_middleware, require_roles};

pub mod client;
pub mod dto;
pub mod errors;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AuthService>,
    pub cookie_secure: bool,
}

impl AppState {
    pub fn new(service: AuthService, cookie_secure: bool) -> Self {
        Self {
            service: Arc::new(service),
            cookie_secure,
        }
    }

    /// Process-local backends for development and tests. Users are seeded
    /// through the returned directory.
    pub fn in_memory(config: JwtConfig) -> (Self, Arc<InMemoryUserDirectory>) {
        let directory = Arc::new(InMemoryUserDirectory::new());
        let service = AuthService::new(
            config,
            directory.clone(),
            Arc::new(InMemoryRefreshTokenRepository::new()),
            Arc::new(InMemoryBlacklist::new()),
        );
        (Self::new(service, false), directory)
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    let admin_guard = RoleGuard::new(state.service.clone(), vec![RoleCode::PlatformAdmin]);
    let admin = routes::admin::router().route_layer(from_fn_with_state(admin_guard, require_roles));

    // Protected routes: bearer token required, SessionContext inserted.
    let protected = routes::auth::protected_router()
        .merge(routes::sessions::router())
        .merge(admin)
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::auth::public_router())
        .merge(protected)
        .with_state(state)
}
