//! `helpdesk-core`: identifiers and the domain error model shared by every
//! crate in the workspace.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{CompanyId, SessionId, UserId};
