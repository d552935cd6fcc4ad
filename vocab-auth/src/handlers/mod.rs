//! HTTP handlers.

pub mod auth;
pub mod health;
pub mod oauth;
pub mod users;
pub mod verification;
