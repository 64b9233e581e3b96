use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::{
    util::random_string, Database, DatabaseError, EncoreContext, NewSession, NewUser, SessionData,
    UserData,
};

/// Issues and resolves host credentials.
///
/// Hosts are the only authenticated identity in the system; attendees stay
/// anonymous and are scoped by their per-room session tokens instead.
pub struct Auth<Db> {
    context: EncoreContext<Db>,
    argon: Argon2<'static>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Username or password is incorrect
    #[error("Invalid credentials")]
    InvalidCredentials,
    /// The username is already taken
    #[error("An account with that username already exists")]
    AlreadyRegistered,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
    #[error("HashError: {0}")]
    HashError(String),
}

impl<Db> Auth<Db>
where
    Db: Database,
{
    pub fn new(context: &EncoreContext<Db>) -> Self {
        Self {
            context: context.clone(),
            argon: Argon2::default(),
        }
    }

    /// Logs in a host, returning a new session
    pub async fn login(&self, credentials: Credentials) -> Result<SessionData, AuthError> {
        self.clear_expired().await?;

        let user = self
            .context
            .database
            .user_by_username(&credentials.username)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => AuthError::InvalidCredentials,
                err => AuthError::Db(err),
            })?;

        let stored_password = PasswordHash::parse(&user.password, Encoding::default())
            .map_err(|e| AuthError::HashError(e.to_string()))?;

        self.argon
            .verify_password(credentials.password.as_bytes(), &stored_password)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let expires_at =
            Utc::now() + Duration::days(self.context.config.session_duration_in_days);

        let new_session = NewSession {
            token: random_string(32),
            user_id: user.id,
            expires_at,
        };

        self.context
            .database
            .create_session(new_session)
            .await
            .map_err(AuthError::Db)
    }

    /// Deletes the associated session, if it exists
    pub async fn logout(&self, token: &str) -> Result<(), DatabaseError> {
        self.context.database.delete_session_by_token(token).await
    }

    /// Creates a host account
    pub async fn register(&self, new_host: NewHost) -> Result<UserData, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hashed_password = self
            .argon
            .hash_password(new_host.password.as_bytes(), &salt)
            .map_err(|e| AuthError::HashError(e.to_string()))?
            .to_string();

        self.context
            .database
            .create_user(NewUser {
                username: new_host.username,
                password: hashed_password,
                display_name: new_host.display_name,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::Conflict { .. } => AuthError::AlreadyRegistered,
                err => AuthError::Db(err),
            })
    }

    /// Returns a host account by id
    pub async fn user_by_id(&self, user_id: crate::PrimaryKey) -> Result<UserData, DatabaseError> {
        self.context.database.user_by_id(user_id).await
    }

    /// Returns the session for a token, if it exists and hasn't expired
    pub async fn session(&self, token: &str) -> Result<SessionData, DatabaseError> {
        let session = self.context.database.session_by_token(token).await?;

        if session.expires_at < Utc::now() {
            return Err(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            });
        }

        Ok(session)
    }

    async fn clear_expired(&self) -> Result<(), AuthError> {
        self.context
            .database
            .clear_expired_sessions()
            .await
            .map_err(AuthError::Db)
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewHost {
    pub username: String,
    pub password: String,
    pub display_name: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Config, Encore, MemoryDatabase};

    fn encore() -> Encore<MemoryDatabase> {
        Encore::new(Config::default(), MemoryDatabase::default())
    }

    fn host(username: &str) -> NewHost {
        NewHost {
            username: username.to_string(),
            password: "hunter2hunter2".to_string(),
            display_name: "The Venue".to_string(),
        }
    }

    #[tokio::test]
    async fn register_and_login_round_trip() {
        let encore = encore();

        encore.auth.register(host("venue")).await.unwrap();

        let session = encore
            .auth
            .login(Credentials {
                username: "venue".to_string(),
                password: "hunter2hunter2".to_string(),
            })
            .await
            .unwrap();

        let resolved = encore.auth.session(&session.token).await.unwrap();
        assert_eq!(resolved.user.username, "venue");
    }

    #[tokio::test]
    async fn wrong_password_is_invalid_credentials() {
        let encore = encore();

        encore.auth.register(host("venue")).await.unwrap();

        let result = encore
            .auth
            .login(Credentials {
                username: "venue".to_string(),
                password: "wrong".to_string(),
            })
            .await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn duplicate_usernames_are_rejected() {
        let encore = encore();

        encore.auth.register(host("venue")).await.unwrap();
        let result = encore.auth.register(host("venue")).await;

        assert!(matches!(result, Err(AuthError::AlreadyRegistered)));
    }

    #[tokio::test]
    async fn logout_invalidates_the_session() {
        let encore = encore();

        encore.auth.register(host("venue")).await.unwrap();

        let session = encore
            .auth
            .login(Credentials {
                username: "venue".to_string(),
                password: "hunter2hunter2".to_string(),
            })
            .await
            .unwrap();

        encore.auth.logout(&session.token).await.unwrap();

        assert!(encore.auth.session(&session.token).await.is_err());
    }
}
