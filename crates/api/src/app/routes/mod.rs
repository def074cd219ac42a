pub mod admin;
pub mod auth;
pub mod sessions;
pub mod system;
