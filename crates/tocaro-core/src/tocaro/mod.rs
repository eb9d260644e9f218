//! Tocaro session, API client and token scraping.
//!
//! This module provides:
//! - HTML scraping of the CSRF and bearer tokens
//! - Form-based sign-in with a cookie-backed session
//! - Groups listing and cursor-paginated message fetching

pub mod auth;
pub mod client;
pub mod extract;
pub mod models;
pub mod pagination;

pub use auth::{AuthSession, SessionConfig};
pub use client::TocaroClient;
pub use extract::{extract_bearer_token, extract_csrf_token};
pub use models::{Group, GroupKind, GroupType, Message};
pub use pagination::PaginationOptions;
