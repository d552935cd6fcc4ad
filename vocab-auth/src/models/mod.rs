pub mod oauth;
pub mod refresh_session;
pub mod user;
pub mod verification;

pub use oauth::{NewOAuthConnection, OAuthBackend, OAuthConnection, OAuthUser};
pub use refresh_session::{NewRefreshSession, RefreshSession};
pub use user::{NewUser, User, UserResponse};
pub use verification::VerificationAction;
