use std::sync::Arc;

use crate::dtos::{UserInCreate, UserInLogin};
use crate::models::{NewUser, User};
use crate::utils::password::{hash_password, verify_password, Password};

use super::error::{AuthError, StoreError};
use super::store::UserStore;

/// Local account creation and credential checks.
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Creates an account; email uniqueness is checked before username.
    #[tracing::instrument(skip_all)]
    pub async fn create(&self, payload: &UserInCreate) -> Result<User, AuthError> {
        if self.users.email_exists(&payload.email).await? {
            return Err(AuthError::EmailAlreadyTaken);
        }
        if self.users.username_exists(&payload.username).await? {
            return Err(AuthError::UsernameAlreadyTaken);
        }

        let password = Password::new(payload.password.clone());
        let hashed_password = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AuthError::Internal(e.into()))??;

        let user = self
            .users
            .create_user(NewUser {
                email: payload.email.clone(),
                username: payload.username.clone(),
                hashed_password,
            })
            .await
            .map_err(|e| match e {
                // Lost a race against a concurrent registration.
                StoreError::Conflict(c) if c.contains("username") => {
                    AuthError::UsernameAlreadyTaken
                }
                StoreError::Conflict(_) => AuthError::EmailAlreadyTaken,
                other => AuthError::Store(other),
            })?;

        tracing::info!(user_id = user.id, "User created");
        Ok(user)
    }

    /// Checks email and password, returning the matching account.
    #[tracing::instrument(skip_all)]
    pub async fn verify(&self, payload: &UserInLogin) -> Result<User, AuthError> {
        let user = self
            .users
            .get_user_by_email(&payload.email)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthError::UserWithSuchEmailDoesNotExist,
                other => AuthError::Store(other),
            })?;

        let password = Password::new(payload.password.clone());
        let hashed = user.hashed_password.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hashed))
            .await
            .map_err(|e| AuthError::Internal(e.into()))??;

        if !matches {
            return Err(AuthError::IncorrectPassword);
        }
        Ok(user)
    }

    pub async fn get(&self, id: i64) -> Result<User, AuthError> {
        self.users.get_user_by_id(id).await.map_err(|e| match e {
            StoreError::NotFound => AuthError::UserNotFound,
            other => AuthError::Store(other),
        })
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.users.email_exists(email).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryDatabase;

    fn payload(email: &str, username: &str) -> UserInCreate {
        UserInCreate {
            email: email.to_string(),
            username: username.to_string(),
            password: "correct horse".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_verify() {
        let service = UserService::new(Arc::new(MemoryDatabase::new()));
        let user = service.create(&payload("a@b.io", "reader_one")).await.unwrap();
        assert_ne!(user.hashed_password, "correct horse");

        let login = UserInLogin {
            email: "a@b.io".into(),
            password: "correct horse".into(),
        };
        assert_eq!(service.verify(&login).await.unwrap().id, user.id);
    }

    #[tokio::test]
    async fn test_email_conflict_reported_before_username() {
        let service = UserService::new(Arc::new(MemoryDatabase::new()));
        service.create(&payload("a@b.io", "reader_one")).await.unwrap();

        assert!(matches!(
            service.create(&payload("a@b.io", "reader_one")).await,
            Err(AuthError::EmailAlreadyTaken)
        ));
        assert!(matches!(
            service.create(&payload("c@d.io", "reader_one")).await,
            Err(AuthError::UsernameAlreadyTaken)
        ));
    }

    #[tokio::test]
    async fn test_verify_errors() {
        let service = UserService::new(Arc::new(MemoryDatabase::new()));
        service.create(&payload("a@b.io", "reader_one")).await.unwrap();

        let unknown = UserInLogin {
            email: "x@y.io".into(),
            password: "correct horse".into(),
        };
        assert!(matches!(
            service.verify(&unknown).await,
            Err(AuthError::UserWithSuchEmailDoesNotExist)
        ));

        let wrong = UserInLogin {
            email: "a@b.io".into(),
            password: "nope".into(),
        };
        assert!(matches!(
            service.verify(&wrong).await,
            Err(AuthError::IncorrectPassword)
        ));
    }
}
