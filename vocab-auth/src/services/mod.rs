//! Business logic of the auth service.
//!
//! Storage and transport concerns sit behind traits (`SessionStore`,
//! `UserStore`, `OAuthConnectionStore`, `KeyValueStore`, `EmailProvider`,
//! `OAuthProvider`) so every flow can run against in-memory doubles.

mod auth;
mod authenticator;
mod blacklist;
mod database;
mod email;
pub mod error;
mod jwt;
mod memory;
mod oauth;
mod oauth_client;
pub mod redis;
pub mod store;
mod user;
mod verification;

pub use auth::AuthService;
pub use authenticator::Authenticator;
pub use blacklist::BlacklistService;
pub use database::Database;
pub use email::{
    EmailProvider, EmailService, MailService, MockEmailService, SentMail, SUBJECT_FOR_THANK,
    SUBJECT_FOR_VERIFICATION,
};
pub use error::{AuthError, StoreError};
pub use jwt::{AccessClaims, JwtService};
pub use memory::MemoryDatabase;
pub use oauth::{CallbackOutcome, OAuthService};
pub use oauth_client::{MockOAuthProvider, OAuthClient, OAuthProvider};
pub use redis::{KeyValueStore, MemoryStore, RedisService};
pub use store::{OAuthConnectionStore, SessionStore, UserStore};
pub use user::UserService;
pub use verification::VerificationService;
