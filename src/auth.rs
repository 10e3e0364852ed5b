use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::models::{Id, Role, Staff, Status, Student, User};
use crate::repo::{collection, RepoError, RepoResult, Store};
use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "campus_session";
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Id,
    pub username: String,
    pub role: Role,
    pub exp: usize,
}

/// Signs and validates session tokens.
#[derive(Clone)]
pub struct Sessions {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
    secure_cookie: bool,
}

impl Sessions {
    pub fn new(secret: &str, ttl_days: i64, secure_cookie: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: chrono::Duration::days(ttl_days),
            secure_cookie,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = (chrono::Utc::now() + self.ttl).timestamp() as usize;
        let claims = Claims { sub: user.id.clone(), username: user.username.clone(), role: user.role, exp };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Validate a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build(SESSION_COOKIE, token)
            .path("/")
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::days(self.ttl.num_days()))
            .finish()
    }

    pub fn expired_cookie(&self) -> Cookie<'static> {
        let mut c = Cookie::build(SESSION_COOKIE, "")
            .path("/")
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .finish();
        c.make_removal();
        c
    }
}

pub fn hash_password(password: &str) -> Result<String, RepoError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| RepoError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

// Unknown usernames still pay for one verification.
static DUMMY_HASH: Lazy<Option<String>> = Lazy::new(|| hash_password("campus-unknown-user").ok());

/// Exact username match followed by a password check. Misses are `None`.
pub async fn authenticate(store: &dyn Store, username: &str, password: &str) -> RepoResult<Option<User>> {
    let Some(user) = collection::<User>(store).find(|u| u.username == username).await? else {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            let _ = verify_password(password, hash);
        }
        return Ok(None);
    };
    Ok(verify_password(password, &user.password_hash).then_some(user))
}

/// Status of the staff/student profile linked to `user`, if one exists.
pub async fn profile_status(store: &dyn Store, user: &User) -> RepoResult<Option<Status>> {
    Ok(match user.role {
        Role::Admin => None,
        Role::Staff => collection::<Staff>(store).find(|s| s.user_id == user.id).await?.map(|s| s.status),
        Role::Student => collection::<Student>(store).find(|s| s.user_id == user.id).await?.map(|s| s.status),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Authenticated(User),
    InvalidCredentials,
    Deactivated,
}

/// Credential check plus the active-status gate for staff and students.
pub async fn login(store: &dyn Store, username: &str, password: &str) -> RepoResult<LoginOutcome> {
    let Some(user) = authenticate(store, username, password).await? else {
        return Ok(LoginOutcome::InvalidCredentials);
    };
    if profile_status(store, &user).await? == Some(Status::Inactive) {
        tracing::info!(username, "login refused for deactivated account");
        return Ok(LoginOutcome::Deactivated);
    }
    Ok(LoginOutcome::Authenticated(user))
}

#[derive(thiserror::Error, Debug)]
pub enum PasswordError {
    #[error("Current password is incorrect")]
    Incorrect,
    #[error("Passwords do not match")]
    Mismatch,
    #[error("Password must be at least 6 characters")]
    TooShort,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub fn check_new_password(password: &str, confirm: &str) -> Result<(), PasswordError> {
    if password != confirm {
        return Err(PasswordError::Mismatch);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(PasswordError::TooShort);
    }
    Ok(())
}

pub async fn change_password(
    store: &dyn Store,
    user_id: &str,
    current: &str,
    new_password: &str,
    confirm: &str,
) -> Result<(), PasswordError> {
    let users = collection::<User>(store);
    let mut user = users.get(user_id).await?.ok_or(RepoError::NotFound)?;
    if !verify_password(current, &user.password_hash) {
        return Err(PasswordError::Incorrect);
    }
    check_new_password(new_password, confirm)?;
    user.password_hash = hash_password(new_password)?;
    if !users.update(user_id, user).await? {
        return Err(RepoError::NotFound.into());
    }
    Ok(())
}

/// Extractor yielding validated `Claims` from the session cookie or a bearer token.
pub struct Auth(pub Claims);

impl Auth {
    pub fn is(&self, role: Role) -> bool { self.0.role == role }
}

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            return ready(Err(actix_web::error::ErrorInternalServerError("session keys unavailable")));
        };
        let token = match BearerAuth::from_request(req, pl).into_inner() {
            Ok(bearer) => Some(bearer.token().to_string()),
            Err(_) => req.cookie(SESSION_COOKIE).map(|c| c.value().to_string()),
        };
        let Some(token) = token else {
            return ready(Err(actix_web::error::ErrorUnauthorized("Authorization required")));
        };
        match state.sessions.verify(&token) {
            Ok(claims) => ready(Ok(Auth(claims))),
            Err(e) => {
                tracing::warn!("session token rejected: {e}");
                ready(Err(actix_web::error::ErrorUnauthorized("Invalid session")))
            }
        }
    }
}

/// Helper macro for role-guarding handlers.
#[macro_export]
macro_rules! require_role {
    ($auth:expr, $role:pat) => {
        if !matches!($auth.0.role, $role) {
            return Err($crate::error::ApiError::Forbidden);
        }
    };
}
