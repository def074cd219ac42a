//! HTTP API: router, bearer middleware and request/response mapping for the
//! helpdesk session service.

pub mod app;
pub mod config;
pub mod middleware;
