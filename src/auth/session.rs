use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rocket::Request;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::Role;

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_TTL_DAYS: i64 = 7;

/// Claims carried by the signed session token. Stateless: there is no
/// server-side session table, so validity is determined entirely by the
/// HMAC signature and the `exp` timestamp. Logout only clears the client
/// cookie; a captured token stays valid until it expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Session {
    pub fn new(id: i64, username: &str, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + Duration::days(SESSION_TTL_DAYS)).timestamp(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<&Self, AppError> {
        if self.is_admin() {
            Ok(self)
        } else {
            tracing::warn!(
                username = %self.username,
                role = %self.role,
                "Administrator access denied"
            );
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
    }
}

/// Sign the session claims with the server secret.
pub fn issue_token(session: &Session, secret: &str) -> Result<String, AppError> {
    encode(
        &Header::default(),
        session,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign session token: {}", e)))
}

/// Check signature and expiry. Malformed, expired and tampered tokens all
/// come back as `None`; callers cannot tell the failures apart.
pub fn verify_token(token: &str, secret: &str) -> Option<Session> {
    decode::<Session>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

/// Build the session cookie: HTTP-only, lax, secure in production, 7 days.
pub fn session_cookie(token: String, production: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(production)
        .path("/")
        .max_age(rocket::time::Duration::days(SESSION_TTL_DAYS))
        .build()
}

pub fn clear_session_cookie(cookies: &CookieJar<'_>) {
    cookies.remove(Cookie::build(SESSION_COOKIE).path("/"));
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match request.rocket().state::<AppConfig>() {
            Some(config) => config,
            _ => {
                tracing::error!("App config not found in managed state");
                return Outcome::Error((Status::InternalServerError, ()));
            }
        };

        let token = request
            .cookies()
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string());

        match token {
            Some(token) => match verify_token(&token, &config.session_secret) {
                Some(session) => {
                    tracing::debug!(username = %session.username, role = %session.role, "Session verified");
                    Outcome::Success(session)
                }
                _ => {
                    tracing::warn!("Invalid or expired session token");
                    Outcome::Error((Status::Unauthorized, ()))
                }
            },
            _ => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn test_token_round_trip() {
        let session = Session::new(7, "casey", Role::User);
        let token = issue_token(&session, SECRET).expect("Failed to sign token");

        let verified = verify_token(&token, SECRET).expect("Token should verify");
        assert_eq!(verified.id, 7);
        assert_eq!(verified.username, "casey");
        assert_eq!(verified.role, Role::User);
        assert_eq!(verified.exp - verified.iat, SESSION_TTL_DAYS * 24 * 60 * 60);
    }

    #[test]
    fn test_expired_token_rejected() {
        let mut session = Session::new(7, "casey", Role::User);
        session.exp = (Utc::now() - Duration::hours(1)).timestamp();

        let token = issue_token(&session, SECRET).expect("Failed to sign token");
        assert!(verify_token(&token, SECRET).is_none());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let session = Session::new(7, "casey", Role::Admin);
        let token = issue_token(&session, SECRET).expect("Failed to sign token");

        let mut tampered = token.clone();
        tampered.pop();
        assert!(verify_token(&tampered, SECRET).is_none());

        assert!(verify_token(&token, "some-other-secret").is_none());
        assert!(verify_token("not-even-a-token", SECRET).is_none());
    }

    #[test]
    fn test_require_admin() {
        let admin = Session::new(1, "alex", Role::Admin);
        assert!(admin.require_admin().is_ok());

        let user = Session::new(2, "casey", Role::User);
        assert!(matches!(
            user.require_admin(),
            Err(AppError::Forbidden(_))
        ));
    }
}
