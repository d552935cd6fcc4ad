use axum::http::StatusCode;
use service_core::error::AppError;
use thiserror::Error;

/// Failures of the relational stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    /// A unique constraint was violated; carries the constraint or column.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classifies driver errors, turning unique violations into `Conflict`.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or_default().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Incorrect password.")]
    IncorrectPassword,

    #[error("User with such email does not exist.")]
    UserWithSuchEmailDoesNotExist,

    #[error("Email is already taken.")]
    EmailAlreadyTaken,

    #[error("Username is already taken.")]
    UsernameAlreadyTaken,

    #[error("Action has not been verified.")]
    ActionRequiresVerification,

    #[error("Refresh session with such refresh token does not exist.")]
    SessionDoesNotExist,

    #[error("Refresh session has expired.")]
    SessionExpired,

    #[error("The access token has expired. Please, refresh.")]
    TokenExpired,

    #[error("The access token is invalid.")]
    TokenMalformed,

    #[error("The access token signature is invalid.")]
    TokenBadSignature,

    #[error("The access token is in blacklist.")]
    TokenBlacklisted,

    #[error("No info about user in session. `/callback` route must requested before.")]
    OAuthUserIsNotInSession,

    #[error(
        "Account with an email from OAuth is already exists. \
         So, it only can be linked to the account with the same email."
    )]
    OAuthLinkingWhenAccountWithSuchEmailExists,

    #[error("OAuth connection does not exist.")]
    OAuthConnectionDoesNotExist,

    #[error("OAuth protocol error: {0}")]
    OAuthProtocol(String),

    #[error("User not found.")]
    UserNotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::IncorrectPassword => "incorrect_password",
            AuthError::UserWithSuchEmailDoesNotExist => "user_with_such_email_does_not_exist",
            AuthError::EmailAlreadyTaken => "email_already_taken",
            AuthError::UsernameAlreadyTaken => "username_already_taken",
            AuthError::ActionRequiresVerification => "action_requires_verification",
            AuthError::SessionDoesNotExist => "session_does_not_exist",
            AuthError::SessionExpired => "session_expired",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenMalformed => "token_malformed",
            AuthError::TokenBadSignature => "token_bad_signature",
            AuthError::TokenBlacklisted => "token_blacklisted",
            AuthError::OAuthUserIsNotInSession => "oauth_user_is_not_in_session",
            AuthError::OAuthLinkingWhenAccountWithSuchEmailExists => {
                "oauth_linking_when_account_with_such_email_exists"
            }
            AuthError::OAuthConnectionDoesNotExist => "oauth_connection_does_not_exist",
            AuthError::OAuthProtocol(_) => "oauth_protocol",
            AuthError::UserNotFound => "user_not_found",
            AuthError::Store(_) => "store",
            AuthError::Cache(_) => "cache",
            AuthError::Internal(_) => "internal",
        }
    }

    pub fn is_login_error(&self) -> bool {
        matches!(
            self,
            AuthError::IncorrectPassword | AuthError::UserWithSuchEmailDoesNotExist
        )
    }

    pub fn is_registration_error(&self) -> bool {
        matches!(
            self,
            AuthError::EmailAlreadyTaken | AuthError::UsernameAlreadyTaken
        )
    }

    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            AuthError::SessionDoesNotExist | AuthError::SessionExpired
        )
    }

    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            AuthError::TokenExpired
                | AuthError::TokenMalformed
                | AuthError::TokenBadSignature
                | AuthError::TokenBlacklisted
        )
    }

    /// Renders the error with an explicit status, keeping its code and message.
    pub fn with_status(self, status: StatusCode) -> AppError {
        if self.is_infrastructure() {
            return self.into();
        }
        let code = self.kind();
        AppError::rejected(status, code, self.to_string())
    }

    fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AuthError::Store(_) | AuthError::Cache(_) | AuthError::Internal(_)
        )
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let status = match &err {
            AuthError::IncorrectPassword
            | AuthError::UserWithSuchEmailDoesNotExist
            | AuthError::ActionRequiresVerification
            | AuthError::SessionDoesNotExist
            | AuthError::SessionExpired
            | AuthError::TokenExpired
            | AuthError::TokenMalformed
            | AuthError::TokenBadSignature
            | AuthError::TokenBlacklisted => StatusCode::UNAUTHORIZED,
            AuthError::EmailAlreadyTaken
            | AuthError::UsernameAlreadyTaken
            | AuthError::OAuthUserIsNotInSession
            | AuthError::OAuthLinkingWhenAccountWithSuchEmailExists
            | AuthError::OAuthConnectionDoesNotExist
            | AuthError::OAuthProtocol(_) => StatusCode::BAD_REQUEST,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Store(StoreError::NotFound) => {
                return AppError::NotFound(anyhow::anyhow!("Record not found"));
            }
            AuthError::Store(StoreError::Conflict(c)) => {
                return AppError::Conflict(anyhow::anyhow!("Unique constraint violated: {}", c));
            }
            AuthError::Store(StoreError::Database(_)) => {
                return AppError::DatabaseError(anyhow::anyhow!(err.to_string()));
            }
            AuthError::Cache(_) | AuthError::Internal(_) => {
                return AppError::InternalError(anyhow::anyhow!(err.to_string()));
            }
        };
        let code = err.kind();
        AppError::rejected(status, code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_helpers() {
        assert!(AuthError::IncorrectPassword.is_login_error());
        assert!(AuthError::UserWithSuchEmailDoesNotExist.is_login_error());
        assert!(AuthError::UsernameAlreadyTaken.is_registration_error());
        assert!(AuthError::SessionExpired.is_session_error());
        assert!(!AuthError::TokenExpired.is_session_error());
        assert!(AuthError::TokenBlacklisted.is_token_error());
    }

    #[test]
    fn test_boundary_status_mapping() {
        assert_eq!(
            AppError::from(AuthError::EmailAlreadyTaken).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(AuthError::SessionDoesNotExist).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(AuthError::Store(StoreError::NotFound)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(AuthError::Cache(anyhow::anyhow!("down"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_with_status_overrides_domain_errors_only() {
        let err = AuthError::SessionExpired.with_status(StatusCode::BAD_REQUEST);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = AuthError::Internal(anyhow::anyhow!("boom")).with_status(StatusCode::BAD_REQUEST);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
